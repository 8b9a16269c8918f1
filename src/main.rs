use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fsi::engine::FileIndex;
use fsi::index::stats;
use fsi::index::types::IndexError;
use fsi::monitor::MonitorConfig;
use fsi::output;
use fsi::query::{DEFAULT_RESULT_LIMIT, QueryScope, SearchOptions};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "fsi")]
#[command(about = "Instant filename search over a persistently indexed filesystem tree")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Search pattern (when no subcommand is given)
    #[arg(trailing_var_arg = true)]
    pattern: Vec<String>,

    /// Case sensitive matching
    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Maximum number of results
    #[arg(short = 'l', long, default_value_t = DEFAULT_RESULT_LIMIT)]
    limit: usize,

    /// Match against the full path instead of the base name
    #[arg(long)]
    full_path: bool,

    /// Restrict results to entries under this directory
    #[arg(long)]
    scope: Option<PathBuf>,

    /// Emit results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or rebuild the index for the given roots
    Build {
        /// Roots to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Run one incremental reconciliation pass
    Update {
        /// Roots to update (all indexed roots when omitted)
        paths: Vec<PathBuf>,
    },
    /// Watch roots and reconcile changes continuously
    Watch {
        /// Roots to watch (all indexed roots when omitted)
        paths: Vec<PathBuf>,
    },
    /// List indexed roots
    Roots,
    /// Forget a root and drop its entries
    Remove {
        /// Root to forget
        path: PathBuf,
    },
    /// Show index statistics
    Stats,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Build { paths }) => cmd_build(paths),
        Some(Commands::Update { paths }) => cmd_update(paths),
        Some(Commands::Watch { paths }) => cmd_watch(paths),
        Some(Commands::Roots) => {
            let index = open_index()?;
            stats::list_roots(index.store())?;
            Ok(())
        }
        Some(Commands::Remove { path }) => cmd_remove(path),
        Some(Commands::Stats) => cmd_stats(),
        None => cmd_search(cli),
    }
}

/// Open the per-user index, translating a corrupt store into actionable
/// advice. Every command except `build` refuses to touch a bad store.
fn open_index() -> Result<FileIndex> {
    FileIndex::open().map_err(|e| match e {
        IndexError::StoreCorrupt(msg) => anyhow::anyhow!(
            "index store is corrupt or unreadable ({msg}); run 'fsi build <path>' to rebuild"
        ),
        other => other.into(),
    })
}

fn cmd_build(paths: Vec<PathBuf>) -> Result<()> {
    // Build is the recovery path: a corrupt store gets replaced wholesale.
    let index = match FileIndex::open() {
        Ok(index) => index,
        Err(IndexError::StoreCorrupt(msg)) => {
            eprintln!("index store unreadable ({msg}); recreating");
            FileIndex::recreate()?
        }
        Err(e) => return Err(e.into()),
    };

    let report = index.build_index(&paths, false)?;
    println!("Indexed {} entries", report.added);
    for failure in &report.failures {
        eprintln!("  failed {}: {}", failure.root.display(), failure.error);
    }
    if report.failures.len() == paths.len() {
        bail!("all roots failed to index");
    }
    Ok(())
}

fn cmd_update(paths: Vec<PathBuf>) -> Result<()> {
    let index = open_index()?;
    let roots = resolve_roots(&index, paths)?;

    let report = index.update_index(&roots)?;
    println!(
        "Update complete: {} added, {} changed, {} removed",
        report.added, report.changed, report.removed
    );
    for failure in &report.failures {
        eprintln!("  failed {}: {}", failure.root.display(), failure.error);
    }
    Ok(())
}

fn cmd_watch(paths: Vec<PathBuf>) -> Result<()> {
    let mut index = open_index()?;
    let roots = resolve_roots(&index, paths)?;
    let config = MonitorConfig::load();

    println!(
        "Watching {} root(s) (poll {}s, debounce {}s). Press Enter to stop.",
        roots.len(),
        config.poll_interval().as_secs(),
        config.debounce_window().as_secs(),
    );
    index.start_monitor(&roots, config)?;

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    println!("Stopping (completing any in-flight pass)...");
    index.stop_monitor();
    Ok(())
}

/// Explicit roots, or every indexed root when none were given.
fn resolve_roots(index: &FileIndex, paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    if !paths.is_empty() {
        return Ok(paths);
    }
    let roots: Vec<PathBuf> = index
        .list_roots()?
        .into_iter()
        .map(|root| PathBuf::from(root.path))
        .collect();
    if roots.is_empty() {
        bail!("no roots indexed yet; run 'fsi build <path>' first");
    }
    Ok(roots)
}

fn cmd_remove(path: PathBuf) -> Result<()> {
    let index = open_index()?;
    let removed = index.remove_root(&path)?;
    println!("Removed root: {} ({} entries)", path.display(), removed);
    Ok(())
}

fn cmd_stats() -> Result<()> {
    let index = open_index()?;
    let location = index
        .store_location()
        .context("store has no on-disk location")?
        .to_path_buf();
    stats::show_stats(index.store(), &location)?;
    Ok(())
}

fn cmd_search(cli: Cli) -> Result<()> {
    let pattern = cli.pattern.join(" ");
    if pattern.trim().is_empty() {
        bail!("no search pattern given (try 'fsi --help')");
    }

    let index = open_index()?;
    let options = SearchOptions {
        case_sensitive: cli.case_sensitive,
        scope: if cli.full_path {
            QueryScope::Path
        } else {
            QueryScope::Name
        },
        scope_path: cli.scope,
        limit: cli.limit,
    };

    let start = Instant::now();
    let results = index
        .search(&pattern, &options)
        .with_context(|| format!("search failed for {pattern:?}"))?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    if cli.json {
        output::print_entries_json(&results)?;
    } else {
        output::print_entries(&results, true)?;
        println!();
        println!("Found {} entries ({elapsed_ms:.1}ms)", results.len());
    }
    Ok(())
}
