//! Broadcasting of job transitions for in-process observers.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster, JobEventKind};
