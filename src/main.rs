use openapi_dispatcher::cli;
use openapi_dispatcher::telemetry::{init_logging, LogConfig};

fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env())?;
    cli::run_cli()
}
