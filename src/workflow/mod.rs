pub mod job_store;
pub mod scrape_flow;

pub use job_store::JobStatusStore;
pub use scrape_flow::{ScrapeFlow, ScrapeOutcome};
