pub mod frame_executor;

pub use frame_executor::{FrameExecutor, FrameHandle, WaitBound};
