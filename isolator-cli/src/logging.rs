//! Tracing setup.
//!
//! Installs a plain `tracing_subscriber::fmt` layer driven by
//! `RUST_LOG`/`EnvFilter`. `-q`/`-d`/`-t` pick a default filter when
//! `RUST_LOG` isn't set; an explicit `RUST_LOG` always wins.

use tracing_subscriber::EnvFilter;

pub fn setup(quiet: bool, debug: bool, trace: bool) {
    let default_directive = if trace {
        "isolator=trace"
    } else if debug {
        "isolator=debug"
    } else if quiet {
        "isolator=error"
    } else {
        "isolator=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
