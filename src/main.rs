//! upprobe - exercise HTTP upload progress reporting from the command line
//!
//! This is the main entry point for the upprobe command-line interface.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::MultiProgress;
use upprobe::client::UploadClient;
use upprobe::config::AppConfig;
use upprobe::error::Result;
use upprobe::report::{self, LogProgress, ProgressReporter, TerminalProgress};
use upprobe::server::{self, ServerConfig};
use upprobe::session::{SessionSnapshot, UploadStatus};

/// Which transport(s) a run exercises
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Callback-driven transport
    Event,

    /// Awaitable transport
    Promise,

    /// Both transports at once, each with its own session
    Both,
}

impl TransportArg {
    fn includes_event(self) -> bool {
        matches!(self, Self::Event | Self::Both)
    }

    fn includes_promise(self) -> bool {
        matches!(self, Self::Promise | Self::Both)
    }
}

#[derive(Parser)]
#[command(name = "upprobe")]
#[command(about = "Upload a generated payload and watch its progress", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a random payload and report progress
    Run {
        /// Transport to exercise
        #[arg(short, long, value_enum, default_value = "event")]
        transport: TransportArg,

        /// Endpoint URL (default: from config)
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Payload size in MiB (default: 5)
        #[arg(short, long)]
        size_mb: Option<f64>,

        /// Seed for reproducible payload contents
        #[arg(long)]
        seed: Option<u64>,

        /// Body slice size in bytes (default: 64KiB)
        #[arg(short, long)]
        chunk_size: Option<usize>,

        /// Log status lines instead of drawing progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Run the local echo endpoint
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },

    /// Show the effective configuration
    Info,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key (e.g., "upload.chunk_size")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "upload.chunk_size")
        key: String,

        /// New value
        value: String,
    },

    /// List all configuration values
    List,

    /// Print the configuration file path
    Path,
}

fn reporter(no_progress: bool, multi: &MultiProgress) -> Box<dyn ProgressReporter> {
    if no_progress {
        Box::new(LogProgress)
    } else {
        Box::new(TerminalProgress::attached(multi))
    }
}

/// Upload through the selected transports until every attempt settles
async fn run(
    client: &UploadClient,
    transport: TransportArg,
    no_progress: bool,
) -> Result<Vec<SessionSnapshot>> {
    let multi = MultiProgress::new();
    let event_reporter = reporter(no_progress, &multi);
    let promise_reporter = reporter(no_progress, &multi);

    let event_handle = if transport.includes_event() {
        Some(client.run_event_driven_test()?)
    } else {
        None
    };

    let event = async {
        match &event_handle {
            Some(_) => Some(report::follow(client.event_session(), event_reporter.as_ref()).await),
            None => None,
        }
    };

    let promise = async {
        if !transport.includes_promise() {
            return None;
        }
        let (result, snapshot) = tokio::join!(
            client.run_promise_test(),
            report::follow(client.promise_session(), promise_reporter.as_ref())
        );
        match result {
            Err(e) if e.is_transport_outcome() => tracing::debug!("Promise upload rejected: {}", e),
            Err(e) => tracing::error!("Promise upload failed: {}", e),
            Ok(_) => {}
        }
        Some(snapshot)
    };

    let (event, promise) = tokio::select! {
        settled = async { tokio::join!(event, promise) } => settled,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, aborting uploads");
            if let Some(handle) = &event_handle {
                handle.abort();
            }
            // The dropped promise upload aborts its own request
            let event = match &event_handle {
                Some(_) => Some(report::follow(client.event_session(), event_reporter.as_ref()).await),
                None => None,
            };
            let promise = if transport.includes_promise() {
                Some(report::follow(client.promise_session(), promise_reporter.as_ref()).await)
            } else {
                None
            };
            (event, promise)
        }
    };

    if let Some(handle) = event_handle {
        handle.finished().await?;
    }

    Ok(event.into_iter().chain(promise).collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; `upload.verbose` in the config file also enables debug output
    let file_verbose = AppConfig::load()
        .map(|config| config.upload.verbose)
        .unwrap_or(false);
    let log_level = if cli.verbose || file_verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    // Execute command
    match cli.command {
        Commands::Run {
            transport,
            endpoint,
            size_mb,
            seed,
            chunk_size,
            no_progress,
        } => {
            let mut config = AppConfig::load()?;

            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }

            if let Some(size) = size_mb {
                config.upload.payload_size_mb = size;
            }

            if let Some(seed) = seed {
                config.upload.payload_seed = Some(seed);
            }

            if let Some(size) = chunk_size {
                config.upload.chunk_size = size;
            }

            let client = UploadClient::with_config(config)?;

            tracing::info!(
                "Uploading {} MiB to {}",
                client.upload_config().payload_size_mb,
                client.endpoint()
            );

            let outcomes = run(&client, transport, no_progress).await?;

            let mut all_completed = true;
            for snapshot in &outcomes {
                match snapshot.elapsed() {
                    Some(elapsed) => println!("{} ({} ms)", snapshot, elapsed.num_milliseconds()),
                    None => println!("{}", snapshot),
                }
                all_completed &= snapshot.status == UploadStatus::Completed;
            }

            if !all_completed {
                std::process::exit(1);
            }
        }

        Commands::Serve { host, port } => {
            server::run_server(ServerConfig { host, port }).await?;
        }

        Commands::Info => {
            let config = AppConfig::load()?;
            println!("upprobe Configuration");
            println!("=====================");
            println!();
            println!("Config File: {}", AppConfig::config_path().display());
            println!("Endpoint: {}", config.endpoint);
            println!();
            println!("Upload Configuration:");
            println!("  Payload Size: {} MiB", config.upload.payload_size_mb);
            match config.upload.payload_seed {
                Some(seed) => println!("  Payload Seed: {}", seed),
                None => println!("  Payload Seed: random"),
            }
            println!("  Chunk Size: {} KiB", config.upload.chunk_size / 1024);
            println!("  Verbose: {}", config.upload.verbose);

            if let Err(e) = config.validate() {
                eprintln!();
                eprintln!("Warning: {}", e);
            }
        }

        Commands::Config { action } => match action {
            ConfigCommands::Get { key } => {
                let config = AppConfig::load()?;
                match config.get_value(&key) {
                    Ok(value) => println!("{}", value),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }

            ConfigCommands::Set { key, value } => {
                let mut config = AppConfig::load()?;
                match config.set_value(&key, &value) {
                    Ok(()) => {
                        config.save()?;
                        println!("Set {} = {}", key, value);
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }

            ConfigCommands::List => {
                let config = AppConfig::load()?;
                println!("upprobe Configuration");
                println!("=====================");
                println!();
                println!("Config File: {}", AppConfig::config_path().display());
                println!();
                println!("  endpoint               = {}", config.endpoint);
                println!("  upload.payload_size_mb = {}", config.upload.payload_size_mb);
                println!("  upload.payload_seed    = {}", config.get_value("upload.payload_seed")?);
                println!("  upload.chunk_size      = {} ({} KiB)",
                    config.upload.chunk_size,
                    config.upload.chunk_size / 1024
                );
                println!("  upload.verbose         = {}", config.upload.verbose);
            }

            ConfigCommands::Path => {
                println!("{}", AppConfig::config_path().display());
            }
        },
    }

    Ok(())
}
