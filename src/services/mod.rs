pub mod csv_export;
pub mod extractor;
pub mod portal_driver;
pub mod snapshot_writer;

pub use extractor::{Extraction, ExtractionReport, Extractor, ProfileField};
pub use portal_driver::{DriverObserver, PortalDriver, ReportFetcher};
pub use snapshot_writer::SnapshotWriter;
