// src/main.rs - Command-line plotter
use clap::Parser;
use griddle_plotter::config::{self, Config};
use griddle_plotter::controller::{Controller, ControllerError, DobotController, DobotOptions, SimController};
use griddle_plotter::{DispatchSettings, Dispatcher, JobOptions, JobOutcome, LogProgress, PlotJob};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "griddle.toml";

#[derive(Parser, Debug)]
#[command(version, about = "Plot G-code with a desktop robot arm")]
struct Cli {
    /// G-code file to plot
    file: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Home the arm before the job
    #[arg(short = 'H', long)]
    home: bool,

    /// Run the priming routine before the job
    #[arg(short, long)]
    prime: bool,

    /// Serial port, overriding the configuration
    #[arg(long)]
    port: Option<String>,

    /// Use the built-in simulated controller instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Print the translated operations as JSON lines and exit without connecting
    #[arg(long)]
    plan: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting griddle-plotter {}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port.clone() {
        config.controller.port = port;
    }

    if cli.plan {
        return plan(&config, cli.file.as_deref()).await;
    }

    let controller: Box<dyn Controller> = if cli.simulate {
        tracing::info!("Using simulated controller");
        Box::new(SimController::new(config.controller.buffer_capacity).with_drain_per_poll(4))
    } else {
        let options = DobotOptions {
            response_timeout: config.controller.response_timeout(),
            tool_on_level: config.controller.tool_on_level,
            max_feed_rate: config.controller.max_feed_rate,
        };
        match DobotController::connect(&config.controller.port, config.controller.baud, options).await {
            Ok(controller) => Box::new(controller),
            Err(ControllerError::Occupied(port)) => {
                tracing::warn!("Controller on {} is occupied; close other programs using it", port);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    };

    let mut dispatcher = Dispatcher::new(controller, DispatchSettings::from(&config.controller))?;
    let job = PlotJob::new(config);
    let options = JobOptions {
        file: cli.file,
        home: cli.home,
        prime: cli.prime,
    };

    let outcome = job.run(&mut dispatcher, &options, &mut LogProgress::new()).await;

    // Release the controller on every path, including failed jobs
    if let Err(e) = dispatcher.shutdown().await {
        tracing::warn!("Failed to disconnect cleanly: {}", e);
    }

    match outcome? {
        JobOutcome::Completed { operations, batches } => {
            tracing::info!("Job complete: {} operations in {} batches", operations, batches);
        }
        JobOutcome::NoFile | JobOutcome::FileNotFound(_) => {}
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG);
            config::load_config(Path::new(DEFAULT_CONFIG))
        }
        None => {
            tracing::info!("No {} found, using built-in defaults", DEFAULT_CONFIG);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn plan(
    config: &Config,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let Some(file) = file else {
        tracing::warn!("Please provide a file to plan");
        return Ok(());
    };
    let translator = griddle_plotter::GCodeTranslator::new(config.translate.clone());
    let queue = translator.translate_file(file).await?;
    for op in queue.ops() {
        println!("{}", serde_json::to_string(op)?);
    }
    Ok(())
}
