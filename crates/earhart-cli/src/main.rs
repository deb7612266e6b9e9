use earhart_cli::{run_cli, CliError};

#[tokio::main]
async fn main() {
    // Run CLI and handle errors
    if let Err(e) = run_cli().await {
        eprintln!("error: {}", e);

        // Exit with appropriate code based on error type
        let exit_code = match e {
            CliError::Configuration(_) => 1,
            CliError::Verification(_) => 2,
            CliError::DeliveryRejected { .. } => 3,
            CliError::InvalidArgument { .. } => 4,
            CliError::Io(_) => 5,
            CliError::Output { .. } => 6,
        };

        std::process::exit(exit_code);
    }
}
