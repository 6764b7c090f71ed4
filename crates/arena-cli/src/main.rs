use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;

use arena_core::{run_tournament, RunControl, RunnerConfig, RunnerHooks};

#[derive(Parser, Debug)]
#[command(name = "arena", about = "UCI engine tournament runner")]
struct Cli {
    /// Tournament configuration (JSON)
    config: PathBuf,

    /// Resume from the checkpoint recorded in the config's output section
    #[arg(long)]
    resume: bool,

    /// Ignore any existing checkpoint and start over
    #[arg(long)]
    fresh: bool,

    /// Override output.checkpoint_json from the config
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<()> {
    if cli.resume && cli.fresh {
        bail!("--resume and --fresh are mutually exclusive");
    }

    let mut config = RunnerConfig::load(&cli.config)?;
    if let Some(checkpoint) = &cli.checkpoint {
        config.output.checkpoint_json = checkpoint.display().to_string();
    }
    config.validate()?;

    let control = Arc::new(RunControl::new());
    {
        let control = control.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nstop requested, finishing current games...");
            control.request_stop();
        })
        .ok();
    }

    let hooks = RunnerHooks {
        log: Some(Arc::new(|line: &str| log::info!("{line}"))),
        ..RunnerHooks::default()
    };
    run_tournament(&config, cli.resume, hooks, &control)
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
