//! Codeboard - shared code dashboard with host telemetry and package installer.
//!
//! Usage:
//!   codeboard serve [--port 8501]        # Start HTTP server
//!   codeboard run <file>                 # Execute a file once and print the result

use clap::{Args as ClapArgs, Parser, Subcommand};
use codeboard::config::{
    Config, DEFAULT_EXEC_TIMEOUT_SECS, DEFAULT_INSTALL_TIMEOUT_SECS, DEFAULT_OUTPUT_LIMIT,
    DEFAULT_PACKAGE_DISPLAY_LIMIT,
};
use codeboard::{http_server, AppState, ExecutionEngine};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codeboard")]
#[command(about = "Shared code dashboard with host telemetry and package installer")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, env = "CODEBOARD_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(long, env = "CODEBOARD_PORT", default_value = "8501")]
        port: u16,
    },
    /// Execute a file once through the engine and print its output
    Run {
        /// Source file to execute
        file: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct RuntimeArgs {
    /// Shared code buffer file
    #[arg(long, global = true, env = "CODEBOARD_BUFFER", default_value = "/tmp/shared_code.py")]
    buffer: PathBuf,

    /// Scratch file every execution writes to
    #[arg(long, global = true, env = "CODEBOARD_SCRATCH", default_value = "/tmp/run_code.py")]
    scratch: PathBuf,

    /// Visitor counter file
    #[arg(long, global = true, env = "CODEBOARD_COUNTER", default_value = "/tmp/visitor_count.txt")]
    counter: PathBuf,

    /// Interpreter used for execution and pip
    #[arg(long, global = true, env = "CODEBOARD_INTERPRETER", default_value = "python3")]
    interpreter: String,

    /// Execution timeout in seconds
    #[arg(long, global = true, env = "CODEBOARD_EXEC_TIMEOUT", default_value_t = DEFAULT_EXEC_TIMEOUT_SECS)]
    exec_timeout: u64,

    /// Package install timeout in seconds
    #[arg(long, global = true, env = "CODEBOARD_INSTALL_TIMEOUT", default_value_t = DEFAULT_INSTALL_TIMEOUT_SECS)]
    install_timeout: u64,

    /// Maximum characters kept per output stream
    #[arg(long, global = true, env = "CODEBOARD_OUTPUT_LIMIT", default_value_t = DEFAULT_OUTPUT_LIMIT)]
    output_limit: usize,

    /// Installed packages shown before the listing is cut off
    #[arg(long, global = true, env = "CODEBOARD_PACKAGE_DISPLAY_LIMIT", default_value_t = DEFAULT_PACKAGE_DISPLAY_LIMIT)]
    package_display_limit: usize,
}

impl RuntimeArgs {
    fn into_config(self) -> Config {
        Config {
            buffer_path: self.buffer,
            scratch_path: self.scratch,
            counter_path: self.counter,
            exec_timeout: Duration::from_secs(self.exec_timeout),
            install_timeout: Duration::from_secs(self.install_timeout),
            output_limit: self.output_limit,
            package_display_limit: self.package_display_limit,
            ..Config::with_interpreter(self.interpreter)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.runtime.into_config();

    match args.command {
        Commands::Serve { host, port } => {
            let state = AppState::new(config);
            // First boot creates the buffer with its placeholder
            if let Err(e) = state.buffer.load() {
                error!(error = %e, "Shared buffer is not usable");
            }
            info!(
                buffer = %state.config.buffer_path.display(),
                interpreter = %state.config.interpreter,
                "Executed code runs with this process's privileges and no sandbox"
            );
            if let Err(e) = http_server::run_server(SocketAddr::new(host, port), state).await {
                eprintln!("Error: {}", e);
                exit(1);
            }
        }
        Commands::Run { file } => {
            let source = match std::fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Error: {}: {}", file.display(), e);
                    exit(1);
                }
            };
            let engine = ExecutionEngine::new(&config);
            match engine.execute(&source).await {
                Ok(result) => {
                    print!("{}", result.stdout);
                    eprint!("{}", result.stderr);
                    if result.timed_out {
                        eprintln!("Error: execution timed out");
                        exit(124);
                    }
                    exit(result.exit_code.unwrap_or(1));
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit(1);
                }
            }
        }
    }
}
