use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use navigation::NavigatorConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod scenarios;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless drill-down and tile streaming sessions")]
struct Args {
    /// JSON configuration file; NAVIGATOR_* environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scripted session to run
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Click an area and follow the drill-down to completion
    Drill,
    /// Area data fails twice before loading
    Retry,
    /// Pan 2 km east and watch tiles hide and load
    Pan,
    /// Tilt the camera to the sky; streaming must do nothing
    Sky,
    All,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match &args.config {
        Some(path) => NavigatorConfig::load(path)?,
        None => {
            let mut config = NavigatorConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
    };

    let selected: &[Scenario] = match args.scenario {
        Scenario::All => &[Scenario::Drill, Scenario::Retry, Scenario::Pan, Scenario::Sky],
        ref one => std::slice::from_ref(one),
    };

    let mut failures = 0;
    for scenario in selected {
        let result = match scenario {
            Scenario::Drill => scenarios::drill_down(&config).await,
            Scenario::Retry => scenarios::retry_then_succeed(&config).await,
            Scenario::Pan => scenarios::pan_east(&config).await,
            Scenario::Sky => scenarios::look_at_sky(&config).await,
            Scenario::All => continue,
        };
        match result {
            Ok(()) => info!("scenario {scenario:?} passed"),
            Err(e) => {
                error!("scenario {scenario:?} failed: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} scenario(s) failed").into());
    }
    Ok(())
}
