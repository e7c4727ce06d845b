//! # tabman CLI
//!
//! ## Usage
//!
//! ```bash
//! tabman --config ./config/tabman.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tabman capture` | Capture, fetch, categorize, and save the open tabs |
//! | `tabman search [TERM]` | Query saved tabs |
//! | `tabman categories` | List categories with tab counts |
//! | `tabman providers` | Show categorization providers and readiness |
//! | `tabman ledger move <DEST>` | Relocate the cumulative ledger |
//!
//! ## Examples
//!
//! ```bash
//! # Capture with the offline classifier only
//! tabman capture --provider keyword
//!
//! # See what would be saved
//! tabman capture --dry-run
//!
//! # Search by tag, newest first, as JSON
//! tabman search --tag rust --json
//!
//! # Keep the ledger in a notes repository: point `storage.ledger_path`
//! # at the new file first, then pull the old ledger into it
//! tabman ledger move ~/notes/all_tabs.md
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tabman::config::{self, Config};
use tabman::pipeline::{self, CaptureOptions, PipelineOutcome};
use tabman::progress::ProgressMode;
use tabman::providers;
use tabman::save::{self, Ledger};
use tabman::search::{self, SearchQuery, SortKey};

const DEFAULT_CONFIG: &str = "./config/tabman.toml";

/// tabman: capture, categorize, and search your browser tabs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tabman.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tabman",
    about = "Capture, categorize, and search the tabs open in your browser",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tabman.toml`; when that file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Progress output on stderr: `human`, `json`, or `off`.
    /// Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the open tabs, fetch their pages, categorize, and save.
    Capture {
        /// Provider to try first: gemini, mistral, ollama, or keyword.
        #[arg(long)]
        provider: Option<String>,

        /// Run everything except the save and print the result.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search saved tabs.
    Search {
        /// Free-text term matched against title, URL, category, and tags.
        term: Option<String>,

        /// Only tabs with a tag containing this text.
        #[arg(long)]
        tag: Option<String>,

        /// Only tabs in this category (exact, case-insensitive).
        #[arg(long)]
        category: Option<String>,

        /// Sort order: newest, title, or host.
        #[arg(long, default_value = "newest")]
        sort: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// List categories of saved tabs with counts.
    Categories,

    /// Show categorization providers, their order, and credential status.
    Providers,

    /// Manage the cumulative ledger file.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Move the ledger to a new path (appends if the destination exists).
    ///
    /// The destination must be the configured `storage.ledger_path`, so
    /// later captures keep writing to the same file.
    Move {
        /// Destination file.
        dest: PathBuf,
        /// Ledger to move. Defaults to `{data_dir}/all_tabs.md` when the
        /// config already points at DEST, otherwise the configured ledger.
        #[arg(long)]
        from: Option<PathBuf>,
        /// Move even though captures will keep using another ledger path.
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn progress_mode(flag: Option<&str>) -> Result<ProgressMode> {
    match flag {
        None => Ok(ProgressMode::default_for_tty()),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some("off") => Ok(ProgressMode::Off),
        Some(other) => anyhow::bail!("Unknown progress mode: {}. Use human, json, or off.", other),
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::Cancelled => {
            println!("Capture cancelled; nothing was saved.");
        }
        PipelineOutcome::DryRun { session, stats } => {
            for (i, tab) in session.tabs.iter().enumerate() {
                println!("{}. [{}] {}", i + 1, tab.category, tab.title);
                println!("    url: {}", tab.url);
                if !tab.tags.is_empty() {
                    println!("    tags: {}", tab.tags.join(", "));
                }
            }
            println!();
            println!("Dry run: {} tabs, nothing saved.", session.len());
            print_stats(stats);
        }
        PipelineOutcome::Saved {
            session,
            stats,
            saved,
        } => {
            if session.is_empty() {
                println!("No tabs to save.");
                return;
            }
            println!("Saved {} tabs.", session.len());
            print_stats(stats);
            if let Some(path) = &saved.snapshot_path {
                println!("  snapshot: {}", path.display());
            }
            if let Some(path) = &saved.markdown_path {
                println!("  markdown: {}", path.display());
            }
            println!("  ledger:   +{} entries", saved.ledger_appended);
        }
    }
}

fn print_stats(stats: &tabman::categorize::CategorizeStats) {
    for (provider, count) in &stats.by_provider {
        println!("  {:<10} {}", provider, count);
    }
    if stats.uncategorized > 0 {
        println!("  {:<10} {}", "(none)", stats.uncategorized);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Capture { provider, dry_run } => {
            let options = CaptureOptions {
                provider,
                dry_run,
                progress: progress_mode(cli.progress.as_deref())?,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let outcome = pipeline::run_capture(&cfg, &options, &cancel).await?;
            print_outcome(&outcome);
        }
        Commands::Search {
            term,
            tag,
            category,
            sort,
            limit,
            json,
        } => {
            let query = SearchQuery {
                term,
                tag,
                category,
                sort: sort.parse::<SortKey>()?,
                limit,
            };
            search::run_search(&cfg, &query, json)?;
        }
        Commands::Categories => {
            search::list_categories(&cfg)?;
        }
        Commands::Providers => {
            providers::list_providers(&cfg)?;
        }
        Commands::Ledger { action } => match action {
            LedgerAction::Move { dest, from, force } => {
                let configured = Ledger::from_config(&cfg.storage);
                let targets_config = configured.path() == dest.as_path();
                if !targets_config {
                    if !force {
                        anyhow::bail!(
                            "captures would keep writing to {}. Set `ledger_path = \"{}\"` \
                             under [storage] first, or pass --force.",
                            configured.path().display(),
                            dest.display()
                        );
                    }
                    tracing::warn!(
                        configured = %configured.path().display(),
                        "ledger moved away from the configured path; the next capture starts a new ledger there"
                    );
                }

                let source = from.unwrap_or_else(|| {
                    if targets_config {
                        cfg.storage.data_dir.join("all_tabs.md")
                    } else {
                        configured.path().to_path_buf()
                    }
                });
                let moved = save::relocate_ledger(&source, &dest)
                    .with_context(|| format!("Failed to move ledger to {}", dest.display()))?;
                println!("Ledger now at {}", moved.display());
            }
        },
    }

    Ok(())
}
