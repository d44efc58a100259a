//! # Artifact Index CLI (`aidx`)
//!
//! The `aidx` binary keeps a local index of a remote artifact repository in
//! sync and searches it.
//!
//! ## Usage
//!
//! ```bash
//! aidx --config ./config/aidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `aidx status` | Show the local index timestamp, document and term counts |
//! | `aidx update` | Fetch the manifest and apply a full or incremental update |
//! | `aidx search "<query>"` | Flat search, ranked |
//! | `aidx grouped "<query>" --by ga` | Grouped search, one line per group |
//! | `aidx pack --records r.json --out dir` | Publish a record set as snapshot + chunk + manifest |
//! | `aidx close [--delete]` | Release the index lock, optionally deleting local files |
//!
//! ## Examples
//!
//! ```bash
//! # Sync according to [update].policy (weekly by default)
//! aidx update --config ./config/aidx.toml
//!
//! # Ignore the policy and re-download the full snapshot
//! aidx update --full
//!
//! # Exact SHA-1 lookup
//! aidx search 'sha1:7ab67e6b20e5332a7fb4fdf2f019aec4275846c2'
//!
//! # Latest version of every Maven plugin
//! aidx grouped 'packaging:maven-plugin' --by ga
//! ```

use artifact_index::context::IndexingContext;
use artifact_index::progress::ProgressMode;
use artifact_index::{config, packer, search, updater};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Artifact Index CLI: an incrementally-synchronized local index of a
/// remote artifact repository.
///
/// All commands except `pack` read a TOML configuration file. See
/// `config/aidx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "aidx",
    about = "Artifact Index: a locally searchable, incrementally updated mirror of a repository index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/aidx.toml")]
    config: PathBuf,

    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the state of the local index.
    Status,

    /// Bring the local index up to the remote head.
    ///
    /// Fetches the manifest and applies either the incremental chunks since
    /// the local timestamp or, when there is no usable chain, the full
    /// snapshot. Honors `[update].policy` unless `--force` or `--full`.
    Update {
        /// Download the full snapshot even if chunks would do.
        #[arg(long)]
        full: bool,

        /// Update now regardless of the configured policy.
        #[arg(long)]
        force: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the local index.
    ///
    /// Query syntax: whitespace separated `[+|-]field(:|~|^)value` clauses.
    /// `+` MUST, `-` MUST_NOT, no prefix SHOULD; `:` exact, `~` scored,
    /// `^` prefix.
    Search {
        query: String,

        /// Maximum number of results. Defaults to `[search].result_limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search and collapse results into groups.
    Grouped {
        query: String,

        /// Grouping: `ga` (groupId:artifactId) or `gav` (with version).
        #[arg(long, default_value = "ga")]
        by: String,

        #[arg(long)]
        json: bool,
    },

    /// Publish a record set as a servable index directory.
    ///
    /// Writes a new snapshot, a chunk against the previous publication, and
    /// the manifest. Does not read the configuration file.
    Pack {
        /// JSON array of artifact records.
        #[arg(long)]
        records: PathBuf,

        /// Output directory (the repository URL clients point at).
        #[arg(long)]
        out: PathBuf,

        /// Publication timestamp (RFC 3339). Defaults to now.
        #[arg(long)]
        timestamp: Option<String>,

        /// Number of chunks to keep.
        #[arg(long, default_value_t = packer::DEFAULT_MAX_CHUNKS)]
        max_chunks: usize,
    },

    /// Release the index lock.
    Close {
        /// Also delete the index and cache directories.
        #[arg(long)]
        delete: bool,
    },
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    // Commands that don't require config
    if let Commands::Pack {
        records,
        out,
        timestamp,
        max_chunks,
    } = &cli.command
    {
        packer::run_pack(records, out, timestamp.as_deref(), *max_chunks)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Status => {
            let ctx = IndexingContext::from_config(&cfg)?;
            let stats = ctx.stats();
            ctx.close(false)?;
            println!("Artifact Index Status");
            println!("=====================");
            println!();
            println!("  Context:     {}", stats.id);
            println!("  Repository:  {} ({})", stats.repository_id, stats.repository_url);
            match stats.timestamp {
                Some(ts) => println!("  Timestamp:   {}", ts),
                None => println!("  Timestamp:   (no local index)"),
            }
            println!("  Documents:   {}", stats.documents);
            println!("  Extractors:  {}", stats.extractors.join(", "));
            println!();
            println!("  Terms by field:");
            for (field, count) in &stats.terms {
                println!("    {:<14} {}", field.to_string(), count);
            }
        }
        Commands::Update {
            full,
            force,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            updater::run_update(&cfg, full, force, mode).await?;
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json)?;
        }
        Commands::Grouped { query, by, json } => {
            search::run_grouped(&cfg, &query, &by, json)?;
        }
        Commands::Close { delete } => {
            let ctx = IndexingContext::from_config(&cfg)?;
            ctx.close(delete)?;
            println!("closed {}", ctx.id());
        }
        Commands::Pack { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
