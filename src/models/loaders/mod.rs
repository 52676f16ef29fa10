pub mod toml_loader;

pub use toml_loader::{load_accounts, parse_accounts};
