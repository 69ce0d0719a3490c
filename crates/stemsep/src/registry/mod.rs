pub mod job;
pub mod store;

pub use job::{JobListing, JobRecord, JobStatus, JobSummary, JobView};
pub use store::JobRegistry;
