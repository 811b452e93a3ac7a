use std::process::ExitCode;

/// Exit code used when the run never starts, e.g. for configuration errors.
const CONFIG_ERROR_CODE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match stagehand::cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(CONFIG_ERROR_CODE)
        }
    }
}
