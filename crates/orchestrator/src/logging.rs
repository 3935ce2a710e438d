//! Logging initialization.
//!
//! Logs go to stderr by default; setting `ARTINET_LOG_FILE` redirects them
//! to a file. `RUST_LOG` filters as usual. Safe to call more than once —
//! only the first call installs a subscriber.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable selecting a log file destination.
pub const LOG_FILE_ENV: &str = "ARTINET_LOG_FILE";

static INIT: Once = Once::new();

/// Install the global tracing subscriber.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive("info".parse().unwrap());

        let file = std::env::var(LOG_FILE_ENV).ok().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

        match file {
            Some(file) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                    .init();
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}
