#[macro_use]
mod log_macros;

pub mod coordinator;
pub mod error;
pub mod lane;
pub mod metrics;
pub mod scheduler;
pub mod tracing_init;

pub use coordinator::Coordinator;
pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use scheduler::Scheduler;
