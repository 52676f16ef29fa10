pub mod attendance;
pub mod document;
pub mod extraction;
pub mod job;
pub mod loaders;

pub use attendance::{AttendanceRecord, AttendanceSummary, StudentProfile};
pub use document::{FrameChoice, RawDocument};
pub use extraction::{ExtractionReport, ProfileField};
pub use job::{Credential, DriverState, JobKey, JobStatus, ScrapeJob, StatusReport};
pub use loaders::load_accounts;
