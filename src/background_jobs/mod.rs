//! Background job scheduling and execution system.
//!
//! Wraps the crawl, feature ingestion, genre sync and embedding sync entry
//! points as jobs run on an interval or in response to hook events.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobRun, JobRunStatus, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
