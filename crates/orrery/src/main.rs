//! Orrery: replay record operations against a schema
//!
//! Main binary with subcommands:
//! - `replay`: Apply an operations file and print the resulting records
//! - `validate`: Check an operations file against a schema without applying it

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod replay;

use replay::{ReplayOptions, load_schema, load_settings, load_transforms};

#[derive(Parser)]
#[command(name = "orrery")]
#[command(about = "Normalized record cache driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every transform in an operations file and print the records
    Replay {
        /// Schema JSON file
        #[arg(long, env = "ORRERY_SCHEMA")]
        schema: PathBuf,

        /// Operations JSON file: an array of operations or operation batches
        #[arg(long, env = "ORRERY_OPERATIONS")]
        operations: PathBuf,

        /// Cache settings JSON file
        #[arg(long, env = "ORRERY_SETTINGS")]
        settings: Option<PathBuf>,

        /// Undo the last N transforms after applying them all
        #[arg(long, value_name = "N")]
        rollback: Option<usize>,

        /// Apply the transforms to a fork, then merge the fork back
        #[arg(long)]
        fork_merge: bool,

        /// Coalesce operations when merging the fork
        #[arg(long, requires = "fork_merge")]
        coalesce: bool,
    },

    /// Validate an operations file against a schema without applying it
    Validate {
        /// Schema JSON file
        #[arg(long, env = "ORRERY_SCHEMA")]
        schema: PathBuf,

        /// Operations JSON file
        #[arg(long, env = "ORRERY_OPERATIONS")]
        operations: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "orrery=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            schema,
            operations,
            settings,
            rollback,
            fork_merge,
            coalesce,
        } => {
            let schema = load_schema(&schema)?;
            let settings = load_settings(settings.as_deref())?;
            let transforms = load_transforms(&operations)?;
            let options = ReplayOptions {
                rollback,
                fork_merge,
                coalesce,
            };

            let store = replay::replay(schema, settings, transforms, &options)?;
            println!("{}", replay::render(&store)?);
            Ok(())
        }

        Commands::Validate { schema, operations } => {
            let schema = load_schema(&schema)?;
            let transforms = load_transforms(&operations)?;
            let checked = replay::validate(schema, &transforms)?;
            info!(operations = checked, "all operations valid");
            Ok(())
        }
    }
}
