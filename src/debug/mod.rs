//! Development-time diagnostics.
//!
//! [`logging::install_tracing`] wires `tracing` output to stderr and reports
//! panics through the same subscriber. The engine itself only emits events;
//! hosts decide whether to install a subscriber at all.

pub mod logging;

pub use logging::install_tracing;
