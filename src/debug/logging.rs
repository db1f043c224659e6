//! Tracing subscriber and panic hook installation.

use std::backtrace::Backtrace;
use std::panic::{self, PanicHookInfo};
use std::sync::Once;
use std::thread;

use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const DEFAULT_FILTER: &str = "info";

// ============================================================================
// Global State
// ============================================================================

static PANIC_HOOK_INSTALLED: Once = Once::new();
static TRACING_INSTALLED: Once = Once::new();

// ============================================================================
// Installation
// ============================================================================

/// Installs a formatted `tracing` subscriber filtered by `RUST_LOG` (default
/// `info`) together with the panic hook. Safe to call more than once.
pub fn install_tracing() {
    TRACING_INSTALLED.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let console = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("rill: a global tracing subscriber is already installed");
        }
    });
    install_panic_hook();
}

/// Routes panics through `tracing` before the previous hook runs (idempotent).
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            report_panic(info);
            previous(info);
        }));
    });
}

// ============================================================================
// Panic Reporting
// ============================================================================

fn report_panic(info: &PanicHookInfo<'_>) {
    let message = extract_panic_message(info);
    let thread_name = thread::current().name().unwrap_or("unnamed").to_string();
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_default();
    let backtrace = Backtrace::capture().to_string();

    tracing::error!(
        target: "rill::panic",
        message = %message,
        thread = %thread_name,
        location = %location,
        backtrace = %backtrace
    );
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installation_is_idempotent() {
        install_tracing();
        install_tracing();
        install_panic_hook();
        assert!(TRACING_INSTALLED.is_completed());
        assert!(PANIC_HOOK_INSTALLED.is_completed());
    }
}
