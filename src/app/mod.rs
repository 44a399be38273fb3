//! Application-level setup for the binary

pub mod error_handling;
pub mod logging;

pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
