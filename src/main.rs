//! stemsplit - batch audio stem separation
//!
//! Command line entry point.
//!
//! # Commands
//!
//! - `process [FILES]... [--folder DIR]`: separate a batch in the background
//!   and render its events as they arrive
//! - `config show` / `config set <KEY> <PATH>`: inspect or change the
//!   persisted directories
//! - `probe`: report the detected accelerator and the resulting tier
//!
//! # Execution Flow
//!
//! 1. Resolve per-installation paths (config file, data and log directories)
//! 2. Initialize logging to `<data_dir>/stemsplit/logs`
//! 3. Open the configuration store (created with defaults on first run)
//! 4. Run the subcommand; `process` creates a tokio runtime whose blocking
//!    pool hosts the batch worker while the main thread prints events

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use stemsplit::services::{
    AcceleratorProbe, BackendSet, NoAcceleratorProbe, NvidiaSmiProbe, collect_audio_files,
};
use stemsplit::{
    APP_NAME, AppPaths, BatchEvent, ConfigKey, ConfigStore, JobRunner, SubmitError, VERSION,
};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "stemsplit")]
#[command(version)]
#[command(about = "Split audio files into stems with spleeter or demucs", long_about = None)]
struct Cli {
    /// Log at debug level and echo logs to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate audio files into stems
    #[clap(visible_alias = "p")]
    Process {
        /// Audio files, processed in the given order
        files: Vec<Utf8PathBuf>,
        /// Also process every audio file directly inside this folder
        #[arg(short, long)]
        folder: Option<Utf8PathBuf>,
        /// Skip accelerator detection and use the low tier back-end
        #[arg(long)]
        cpu_only: bool,
    },
    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Report the detected accelerator and capability tier
    Probe,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config file location and directories
    Show,
    /// Change a directory (model_dir or output_dir)
    Set {
        key: ConfigKey,
        path: Utf8PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let paths = AppPaths::platform();
    let _guard = stemsplit::logging::setup_logging(&paths.log_dir, APP_NAME, cli.debug, cli.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let store = ConfigStore::open(&paths.config_file, paths.default_settings())
        .with_context(|| format!("Failed to open configuration at {}", paths.config_file))?;

    match cli.command {
        Commands::Process {
            files,
            folder,
            cpu_only,
        } => run_process(Arc::new(store), files, folder, cpu_only),
        Commands::Config { command } => {
            run_config(&store, command)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe => {
            run_probe();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_process(
    store: Arc<ConfigStore>,
    mut files: Vec<Utf8PathBuf>,
    folder: Option<Utf8PathBuf>,
    cpu_only: bool,
) -> Result<ExitCode> {
    if let Some(folder) = folder {
        files.extend(collect_audio_files(&folder)?);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("stemsplit-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let probe: Arc<dyn AcceleratorProbe> = if cpu_only {
        tracing::info!("Accelerator detection disabled (--cpu-only)");
        Arc::new(NoAcceleratorProbe)
    } else {
        Arc::new(NvidiaSmiProbe::new())
    };

    let runner = JobRunner::new(store, probe, BackendSet::external(), runtime.handle().clone());

    let mut handle = match runner.submit(files) {
        Ok(handle) => handle,
        Err(e @ SubmitError::EmptyBatch) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let summary = runtime.block_on(async {
        let mut summary = None;
        while let Some(event) = handle.recv().await {
            match event {
                BatchEvent::Log(line) => println!("{}", line),
                BatchEvent::Progress {
                    processed,
                    total,
                    file_label,
                } => println!("[{}/{}] {}", processed, total, file_label),
                BatchEvent::Finished(batch_summary) => summary = Some(batch_summary),
            }
        }
        summary
    });

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    let summary = summary.context("Batch ended without a completion event")?;
    println!("{}", summary.describe());
    tracing::info!("{}", summary.describe());

    Ok(if summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_config(store: &ConfigStore, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("config_file: {}", store.path());
            for key in ConfigKey::ALL {
                println!("{}: {}", key, store.get(key));
            }
        }
        ConfigCommands::Set { key, path } => {
            store
                .set(key, path.clone())
                .with_context(|| format!("Failed to set {} to {}", key, path))?;
            println!("{} = {}", key, path);
        }
    }
    Ok(())
}

fn run_probe() {
    let info = NvidiaSmiProbe::new().detect();
    println!("accelerator: {}", if info.available { "present" } else { "absent" });
    println!("capacity: {:.2} GB", info.capacity_gb);
    println!("tier: {}", info.tier());
}
