use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use range_link::settings::Settings;
use range_link::{cli, rx, tx};

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("range_link={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(&args.config)?;

    match args.cmd {
        cli::Cmd::Send(opts) => tx::send(opts, &settings),
        cli::Cmd::Stop(opts) => tx::stop(opts, &settings),
        cli::Cmd::Round(opts) => tx::round(opts, &settings),
        cli::Cmd::Console(opts) => tx::console(opts, settings),
        cli::Cmd::Monitor(opts) => rx::run(opts),
        cli::Cmd::Decode(opts) => rx::decode(opts),
        cli::Cmd::Settings(opts) => run_settings(opts, settings, &args.config),
    }
}

fn run_settings(opts: cli::SettingsOpts, mut settings: Settings, path: &Path) -> Result<()> {
    match opts.action {
        cli::SettingsAction::Show => {}
        cli::SettingsAction::Set { pairs } => {
            for pair in &pairs {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("expected key=value, got {pair}"))?;
                settings.set(key, value)?;
            }
            settings.save(path)?;
        }
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
