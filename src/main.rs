mod cmd;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process;
use tracing::Level;
use transformers_auto::{BackendKind, Family, Task};

#[derive(Parser)]
#[command(name = "transformers-auto")]
#[command(version)]
#[command(about = "Resolve, build and load pretrained transformer models", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported families in marker order
    Families,
    /// Show which family an identifier resolves to
    Resolve { identifier: String },
    /// Print the resolved configuration of an identifier
    Config {
        identifier: String,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
        overrides: Vec<(String, Value)>,
        #[arg(long)]
        keep_unknown: bool,
    },
    /// Print the registry tables of a backend
    Tables {
        #[arg(short, long, default_value = "candle")]
        backend: BackendKind,
    },
    /// Build a freshly initialized model and save it to a directory
    Init {
        family: Family,
        task: Task,
        dir: PathBuf,
        #[arg(short, long, default_value = "candle")]
        backend: BackendKind,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
        overrides: Vec<(String, Value)>,
    },
    /// Load a pretrained model and report how its weights matched
    Inspect {
        identifier: String,
        #[arg(short, long, default_value = "base")]
        task: Task,
        #[arg(short, long, default_value = "candle")]
        backend: BackendKind,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        from_alternate: bool,
    },
}

fn parse_override(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {}", s))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Families => cmd::families(),
        Commands::Resolve { identifier } => cmd::resolve(&identifier),
        Commands::Config {
            identifier,
            overrides,
            keep_unknown,
        } => cmd::config(&identifier, overrides, keep_unknown),
        Commands::Tables { backend } => cmd::tables(backend),
        Commands::Init {
            family,
            task,
            dir,
            backend,
            overrides,
        } => cmd::init(family, task, &dir, backend, overrides),
        Commands::Inspect {
            identifier,
            task,
            backend,
            strict,
            from_alternate,
        } => cmd::inspect(&identifier, task, backend, strict, from_alternate),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
