//! Telemetry: structured logging, optional OTLP trace export, and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use coursepulse_core::telemetry::{self, LoggingConfig};
//!
//! telemetry::init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! let handle = telemetry::install_recorder().expect("Failed to install metrics recorder");
//! println!("{}", handle.render());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, shutdown, LogFormat, LoggingConfig};
pub use metrics::{describe_metrics, install_recorder};

/// Service name reported in traces and startup logs.
pub const SERVICE_NAME: &str = "coursepulse-server";
