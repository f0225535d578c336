pub mod config;
pub mod license;
pub mod logging;
pub mod meter;
pub mod metrics;
pub mod runtime;
pub mod types;
pub mod validate;
pub mod window;

pub use config::FlowConfig;
pub use license::{LicenseConfig, LicenseOverridesConfig};
pub use logging::{LogFormat, LoggingConfig};
pub use meter::MeterConfig;
pub use metrics::MetricsConfig;
pub use runtime::{LaneConfig, SchedulerConfig};
pub use types::{ByteSize, HumanDuration};
pub use window::WindowConfig;
