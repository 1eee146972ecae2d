pub mod job;
pub mod pool;
pub mod queue;
pub mod retry;

pub use job::{Job, JobStats, JobStatus};
pub use pool::{JobHandler, WorkerPool};
pub use queue::{JobQueue, Pop};
pub use retry::RetryQueue;
