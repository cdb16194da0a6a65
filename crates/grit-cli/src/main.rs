//! Grit CLI - a minimal wire-compatible git client.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod worktree;

/// Grit - minimal content-addressed version control
#[derive(Parser, Debug)]
#[command(name = "grit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new repository
    Init {
        /// Path to initialize (default: current directory)
        path: Option<String>,
    },

    /// Clone a repository over smart HTTP
    Clone {
        /// Repository URL
        url: String,
        /// Destination path
        path: Option<String>,
    },

    /// Stage file contents in the index
    Add {
        /// Paths to stage
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Summarize index vs working tree differences
    Status,

    /// Walk commit history from HEAD
    Log {
        /// Maximum number of commits to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },

    /// Pretty-print an object found by hash prefix
    CatFile {
        /// Full or abbreviated object hash
        prefix: String,
    },

    /// Hash a file as a blob
    HashObject {
        /// Write the blob into the object store
        #[arg(short, long)]
        write: bool,
        /// File to hash
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("grit={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(path.as_deref()),
        Commands::Clone { url, path } => commands::clone(&url, path.as_deref()),
        Commands::Add { paths } => commands::add(&paths),
        Commands::Status => commands::status(),
        Commands::Log { count } => commands::log(count),
        Commands::CatFile { prefix } => commands::cat_file(&prefix),
        Commands::HashObject { write, file } => commands::hash_object(&file, write),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
