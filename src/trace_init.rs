#[cfg(feature = "trace")]
use std::path::Path;
#[cfg(feature = "trace")]
use std::sync::Once;

#[cfg(feature = "trace")]
static INIT: Once = Once::new();

#[cfg(feature = "trace")]
const DEFAULT_FILTER: &str = "clp_engine=debug";

/// Install the global subscriber once.
///
/// With a directory, spans and events go as JSON lines to
/// `<dir>/consensus-trace.jsonl`; without one, human-readable to stderr.
/// `RUST_LOG` overrides the default filter.
#[cfg(feature = "trace")]
pub fn init_tracing(log_dir: Option<&Path>) {
    INIT.call_once(|| {
        let filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
        };
        match log_dir {
            Some(dir) => {
                // Blocking writer: a batch run must not lose the tail of the
                // trace when the process exits.
                let file_appender = tracing_appender::rolling::never(dir, "consensus-trace.jsonl");

                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file_appender)
                    .with_target(true)
                    .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
                    .with_env_filter(filter())
                    .init();
            }
            None => {
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_env_filter(filter())
                    .init();
            }
        }
    });
}

#[cfg(not(feature = "trace"))]
pub fn init_tracing(_log_dir: Option<&std::path::Path>) {}
