pub mod atom;
pub mod atoms;
pub mod error;
pub mod ext;
pub mod gate;
pub mod license;
pub mod meter;
pub mod reducers;
pub mod registry;
pub mod signal;
pub mod sink;
pub mod workflow;

pub use atoms::register_builtin as register_builtin_atoms;
pub use error::{CoreError, CoreReason, CoreResult};
pub use meter::WorkUnitMeter;
pub use registry::AtomRegistry;
pub use sink::SignalSink;
