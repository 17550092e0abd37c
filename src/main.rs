use clap::Parser;
use rankscan::cli::{Cli, Command, IdArgs, PageArgs};
use rankscan::config::Config;
use rankscan::monitor::ChangeMonitor;
use rankscan::page::{html, Document};
use rankscan::pipeline;
use rankscan::report;
use rankscan::snapshot;
use rankscan::store::sqlite::{self, SqliteBackend};
use rankscan::store::SnapshotStore;
use rankscan::watch::{self, FilePage, Watcher};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("RANKSCAN_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &Config) -> SnapshotStore<SqliteBackend> {
    let path = match &config.db_path {
        Some(path) => path.clone(),
        None => sqlite::default_db_path().unwrap_or_else(|e| {
            eprintln!("Error locating database: {e}");
            std::process::exit(1);
        }),
    };

    let backend = SqliteBackend::open(&path).unwrap_or_else(|e| {
        eprintln!("Error opening database {}: {e}", path.display());
        std::process::exit(1);
    });

    SnapshotStore::new(backend, &config.origin, config.max_snapshots)
}

fn load_page(path: &Path, config: &Config) -> Document {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading page {}: {e}", path.display());
        std::process::exit(1);
    });

    html::parse(&source, &config.content_selector).unwrap_or_else(|e| {
        eprintln!("Error parsing page {}: {e}", path.display());
        std::process::exit(1);
    })
}

fn write_page(doc: &Document, output: Option<&Path>) {
    let Some(output) = output else { return };
    if let Err(e) = std::fs::write(output, html::render(doc)) {
        eprintln!("Error writing {}: {e}", output.display());
        std::process::exit(1);
    }
}

fn parse_id(args: &IdArgs) -> i64 {
    args.id.parse().unwrap_or_else(|_| {
        eprintln!("Invalid snapshot ID: '{}'. Must be a number.", args.id);
        std::process::exit(1);
    })
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn save(args: &PageArgs, config: &Config) {
    let mut store = open_store(config);
    let mut doc = load_page(&args.page, config);

    match snapshot::save_current(&mut doc, &mut store, snapshot::now_millis()) {
        Ok((id, outcome)) => {
            let taken = store.get(id).map(|s| s.taken_at()).unwrap_or(id);
            println!("Snapshot saved: #{id} ({})", report::format_timestamp(taken));
            if config.verbose {
                println!("{outcome}");
            }
            write_page(&doc, args.output.as_deref());
        }
        Err(reason) => {
            eprintln!("Snapshot failed: {reason}.");
            std::process::exit(1);
        }
    }
}

fn list(config: &Config) {
    let store = open_store(config);
    let mut snapshots = store.load();
    snapshots.reverse();

    if snapshots.is_empty() {
        println!("No snapshots found. Run 'rankscan save <page>' to create one.");
        return;
    }

    let baseline = store.resolve_baseline().map(|s| s.id);

    println!("Snapshots ({} of {} kept):", snapshots.len(), store.max_snapshots());
    println!("{:<16} {:<20} {:<8} {}", "ID", "Date", "Players", "");
    println!("{}", "-".repeat(56));

    for snapshot in snapshots {
        let marker = if Some(snapshot.id) == baseline { "baseline" } else { "" };
        println!(
            "{:<16} {:<20} {:<8} {}",
            snapshot.id,
            report::format_timestamp(snapshot.taken_at()),
            snapshot.players.len(),
            marker
        );
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_cli(&cli).unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}");
        std::process::exit(1);
    });

    match &cli.command {
        Command::Save(args) => save(args, &config),
        Command::Annotate(args) => {
            let store = open_store(&config);
            let mut doc = load_page(&args.page.page, &config);
            if let Some(hidden) = args.diffs_hidden() {
                doc.diffs_hidden = hidden;
            }

            let outcome = pipeline::run_pass(&mut doc, &store);
            report::print(&outcome, args.json);
            if !args.json {
                println!("\n{}", report::status_line(&store));
            }
            write_page(&doc, args.page.output.as_deref());
        }
        Command::Watch(args) => {
            let store = open_store(&config);
            let interval = args.interval.as_deref().copied().unwrap_or(config.poll_interval);
            let watcher = Watcher::new(
                FilePage::new(&args.page),
                store,
                ChangeMonitor::new(config.debounce, config.cooldown),
                &args.output,
                &config.content_selector,
            );

            println!(
                "Watching {} (writing {}), press Ctrl-C to stop",
                args.page.display(),
                args.output.display()
            );
            if let Err(e) = watch::run(watcher, interval) {
                eprintln!("Error watching page: {e}");
                std::process::exit(1);
            }
        }
        Command::List => list(&config),
        Command::Apply(args) => {
            let id = parse_id(args);
            let mut store = open_store(&config);
            if !store.select_baseline(id) {
                eprintln!("Snapshot {id} not found");
                std::process::exit(1);
            }
            println!("Baseline set to snapshot #{id}");
            println!("{}", report::status_line(&store));
        }
        Command::Delete(args) => {
            let id = parse_id(args);
            let mut store = open_store(&config);
            if !store.delete(id) {
                eprintln!("Snapshot {id} not found");
                std::process::exit(1);
            }
            println!("Deleted snapshot #{id}");
            println!("{}", report::status_line(&store));
        }
        Command::Clear(args) => {
            let mut store = open_store(&config);
            let confirmed = args.yes || confirm("Delete ALL snapshots? This cannot be undone.");
            if store.clear_all(confirmed) {
                println!("All snapshots cleared.");
            } else {
                println!("Nothing deleted.");
            }
        }
        Command::Status => {
            let store = open_store(&config);
            println!("{}", report::status_line(&store));
        }
    }
}
