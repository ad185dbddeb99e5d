//! Closure conversion driver for the Cacophony backend.
//!
//! Ties the analyses in `caco_analysis` to the frame machinery in
//! `caco_frame`:
//!
//! ```text
//! Program ─► variables map ─► call graph ─► static structure
//!         ─► escape analysis ─► classification ─► handlers
//! ```
//!
//! [`convert_closures`] runs the whole chain once per compilation unit and
//! returns a [`ClosureConversion`] that body lowering queries for variable
//! accesses, prologues, epilogues and call sites. Every failure is a
//! [`CompileError`], rendered as an internal compiler error.
//!
//! # Tracing
//!
//! Set `RUST_LOG` to see pass boundaries (`debug`) or per-entity updates
//! (`trace`):
//!
//! ```bash
//! RUST_LOG=caco_analysis=debug,caco_frame=trace cargo test -p cacoc
//! ```

mod config;
mod error;
mod pipeline;

use std::sync::Once;

pub use config::BackendConfig;
pub use error::CompileError;
pub use pipeline::{convert_closures, ClosureConversion};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Safe to call any number of times; only the first call can install
/// anything, and nothing is installed when `RUST_LOG` is unset.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
