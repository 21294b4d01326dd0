//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout / log aggregation
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
