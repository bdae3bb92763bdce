//! Processing engine: the batch worker and the polling scheduler around it.

pub mod processor;
pub mod scheduler;

pub use processor::Processor;
pub use scheduler::{ConfigUpdate, Scheduler, SchedulerHandle};
