use clap::Parser;

use kvantor::app::{handle_fatal_error, init_logging};
use kvantor::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    init_logging(verbose);

    if let Err(e) = execute_command(cli).await {
        handle_fatal_error(e, verbose);
    }
}
