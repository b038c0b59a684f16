//! Logging sink used by the plugin manager
//!
//! Two process-wide handlers (info and error) receive every message the
//! manager produces. Until an embedder installs its own handler, messages are
//! emitted as `tracing` events with the `pim` target when the host has set a
//! global subscriber, and written to stdout (info) or stderr (error)
//! otherwise, so leak reports are never silently dropped.
//!
//! ```
//! pim::logging::set_error_handler(|msg| eprintln!("plugin trouble: {msg}"));
//! pim::logging::reset_handlers();
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Callback receiving one fully formatted log message
pub type LogHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    info: Option<LogHandler>,
    error: Option<LogHandler>,
}

static HANDLERS: Lazy<RwLock<Handlers>> = Lazy::new(|| RwLock::new(Handlers::default()));

/// Replace the info handler for the whole process
pub fn set_info_handler<F>(handler: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    HANDLERS.write().info = Some(Arc::new(handler));
}

/// Replace the error handler for the whole process
///
/// Leak reports at manager teardown go through this handler.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    HANDLERS.write().error = Some(Arc::new(handler));
}

/// Restore the default sinks
pub fn reset_handlers() {
    *HANDLERS.write() = Handlers::default();
}

/// Where messages go when no handler is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefaultSink {
    Tracing,
    Streams,
}

fn default_sink() -> DefaultSink {
    if tracing::dispatcher::has_been_set() {
        DefaultSink::Tracing
    } else {
        DefaultSink::Streams
    }
}

/// Log an informational message
pub fn info(msg: &str) {
    // Clone out of the lock so a handler may itself swap handlers
    let handler = HANDLERS.read().info.clone();
    match (handler, default_sink()) {
        (Some(handler), _) => handler(msg),
        (None, DefaultSink::Tracing) => tracing::info!(target: "pim", "{}", msg),
        (None, DefaultSink::Streams) => println!("{msg}"),
    }
}

/// Log an error message
pub fn error(msg: &str) {
    let handler = HANDLERS.read().error.clone();
    match (handler, default_sink()) {
        (Some(handler), _) => handler(msg),
        (None, DefaultSink::Tracing) => tracing::error!(target: "pim", "{}", msg),
        (None, DefaultSink::Streams) => eprintln!("{msg}"),
    }
}
