//! Fatal error reporting for the binary

use tracing::error;

use crate::error::Error;
use crate::storage::StorageError;

/// Exit code for a failed command
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<Error>() {
        return match e {
            Error::Config(_) | Error::Toml(_) => 2,
            e if e.is_retryable() => 75,
            _ => 1,
        };
    }
    match error.downcast_ref::<StorageError>() {
        Some(e) if e.is_retryable() => 75,
        _ => 1,
    }
}

/// Print `error` and exit. The cause chain is shown with `-v`.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}
