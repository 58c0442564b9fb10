use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "wasiboot",
    about = "wasiboot — load a WASI preview-1 module and run it once",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format (logs always go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, compile, bind and start a module.
    ///
    /// The artifact defaults to [artifact].path from wasiboot.toml, or
    /// target/wasm32-wasi/release/idkhtml.wasm. The process exits with the
    /// guest's exit code.
    Run(commands::run::RunArgs),
    /// Print a module's imports, exports and entry point
    Inspect {
        /// Path to the wasm artifact
        artifact: Option<std::path::PathBuf>,
        /// Config file (default: ./wasiboot.toml if present)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
        /// Entry point export to look for
        #[arg(long)]
        entry: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Generate a wasiboot.toml scaffold
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Artifact path to write into the scaffold
        #[arg(long)]
        artifact: Option<String>,
        /// Overwrite an existing wasiboot.toml
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("wasiboot=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Run(args) => {
            let code = runtime.block_on(commands::run::run(args))?;
            if code != 0 {
                // process::exit skips destructors.
                use std::io::Write;
                std::io::stdout().flush()?;
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Inspect {
            artifact,
            config,
            entry,
            format,
        } => runtime.block_on(commands::inspect::inspect(
            artifact.as_deref(),
            config.as_deref(),
            entry.as_deref(),
            &format,
        )),
        Commands::Init {
            path,
            artifact,
            force,
        } => commands::init::init(&path, artifact.as_deref(), force),
    }
}
