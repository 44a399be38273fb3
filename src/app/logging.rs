//! Logging initialization

use tracing::{debug, trace};

/// Filter directive for a `-v` count
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,reqwest=debug",
    }
}

/// Initialize tracing for the binary. Logs go to stderr so command output
/// on stdout stays clean.
pub fn init_logging(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level(verbose))
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .with_line_number(verbose >= 3)
        .init();

    debug!("kvantor started with verbosity level: {}", verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
