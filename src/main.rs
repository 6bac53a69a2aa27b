#![allow(clippy::result_large_err)]

use anyhow::Context;
use cps::app::CpsApp;
use cps::config::CpsConfig;
use cps::telemetry;
use tracing::info;

enum CliCommand {
    Run { config_file: Option<String> },
    Help,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_cli_args()? {
        CliCommand::Run { config_file } => {
            let config = CpsConfig::load(config_file.as_deref())
                .context("failed to load configuration")?;

            telemetry::init_tracing(config.log.level.as_deref(), config.dev)
                .context("failed to initialise telemetry")?;

            info!(
                bucket = config.s3.bucket.as_deref().unwrap_or_default(),
                consul_enabled = config.consul.enabled,
                api_version = config.api.version,
                "CPS started"
            );

            let app = CpsApp::initialise(config)
                .await
                .context("failed to construct application")?;

            app.run().await.context("application runtime error")
        }
        CliCommand::Help => {
            print_help();
            Ok(())
        }
    }
}

fn parse_cli_args() -> anyhow::Result<CliCommand> {
    let mut args = std::env::args().skip(1);
    let mut config_file = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                if config_file.is_some() {
                    anyhow::bail!("config file specified multiple times");
                }
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("expected path after {arg}"))?;
                config_file = Some(value);
            }
            "-h" | "--help" => return Ok(CliCommand::Help),
            other => anyhow::bail!("unrecognised argument `{other}`"),
        }
    }

    Ok(CliCommand::Run { config_file })
}

fn print_help() {
    println!(
        "\
Usage: cps [OPTIONS]

Options:
  -c, --config <PATH>    Path to a cps config file (otherwise /etc/cps/cps.*
                         and ./cps.* are consulted, then CPS_* environment
                         variables)
  -h, --help             Print this help message
"
    );
}
