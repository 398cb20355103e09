//! Prometheus metrics for the webhook configuration controller
//!
//! The `report_*` functions are the observability signals emitted by the
//! reconciler; the HTTP server exposes them alongside health probes.

mod prometheus;

pub use prometheus::*;
