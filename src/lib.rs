//! # Media Cleaner
//!
//! Finds duplicate photos and videos by content and moves the redundant
//! copies out of the way, keeping one master per group.
//!
//! ## Architecture
//! - `core` - Catalog, scan pipeline, resolver and relocator
//! - `events` - Progress events for front ends
//! - `error` - Error types
//!
//! Fingerprints are cached in an append-only JSON-lines log so repeated runs
//! only hash files that changed.

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{DedupError, Result};

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the binary.
///
/// `verbosity` counts `-v` flags: warnings by default, then info, debug and
/// trace. `RUST_LOG` takes precedence when set. Calling this twice is
/// harmless; the first subscriber stays installed.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
