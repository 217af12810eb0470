pub mod batch;
pub mod executor;
pub mod jobs;
pub mod pool;

pub use batch::{run_batch, BatchReport, BatchRequest, BatchSettings};
pub use executor::{AdmissionError, Dispatcher};
pub use jobs::{JobCounts, JobStore, JobStoreError};
pub use pool::{QueuedJob, SubmitError, WorkerPool};
