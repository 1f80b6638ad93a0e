//! Ingestion, summary binding and scheduling for finch.
//!
//! [`Engine`] owns the shared state (collection index, artifact store,
//! roster, adapters) and exposes the operations the API and the scheduler
//! drive: `collect`, `run_batch`, `persist` and `status`.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod summary;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use coordinator::Coordinator;
pub use engine::{BatchState, Engine, SystemStatus};
pub use error::{Error, Result};
pub use scheduler::{BatchReport, CompanyFailure, DailySchedule, SchedulerConfig, SchedulerDriver, SchedulerHandle};
pub use summary::{SummaryQueue, SummaryReceiver, SummaryRequest, SummaryWorker, bind_summary};
