//! Irrigation binary, called by cron once an hour.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use verdant::{components::prelude::*, messages::logging::init_file_logging};

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Pass `now` to water immediately, the weather is still checked.
    /// Any other token is ignored and the normal schedule applies.
    trigger: Option<String>,
    /// Path to the config file for the irrigation component.
    #[arg(short, long, default_value = "config.yaml")]
    filepath: PathBuf,
    /// Log file, appended to on every invocation.
    #[arg(short, long, default_value = "sprinkler.log")]
    log_file: PathBuf,
    /// Write the config as json to this path and exit without watering.
    #[arg(long)]
    export_json: Option<PathBuf>,
}

impl Args {
    fn forces_run(&self) -> bool {
        self.trigger.as_deref() == Some("now")
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_file_logging(&args.log_file)
        .with_context(|| format!("Failed to open log file {:?}", args.log_file))?;

    let config = IrrigationConfig::from_file(&args.filepath).map_err(|e| {
        tracing::error!("{e}");
        e
    })?;

    if let Some(path) = args.export_json {
        config
            .to_json_file(&path)
            .with_context(|| format!("Failed to export config to {path:?}"))?;
        tracing::info!("Config exported to {path:?}");
        return Ok(());
    }

    let force_now = args.forces_run();
    match IrrigationController::start(&config, force_now).await {
        Ok(decision) => {
            tracing::info!("Finished with {decision:?}");
            Ok(())
        }
        Err(e) => {
            tracing::error!("{e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["irrigation"], false)]
    #[case(&["irrigation", "now"], true)]
    #[case(&["irrigation", "later"], false)]
    #[case(&["irrigation", "NOW"], false)]
    #[case(&["irrigation", "-f", "garden.yaml", "now"], true)]
    fn test_only_now_forces_a_run(#[case] argv: &[&str], #[case] expected: bool) {
        let args = Args::try_parse_from(argv).expect("Arguments rejected");
        assert_eq!(args.forces_run(), expected);
    }
}
