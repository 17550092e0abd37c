use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rankscan")]
#[command(about = "Snapshot a leaderboard page and annotate it with changes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Host the page belongs to; snapshots are kept per host
    #[arg(long, global = true)]
    pub origin: Option<String>,

    /// Database file (defaults to the platform data dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// CSS selector of the region holding the ranking table
    #[arg(long, global = true)]
    pub content_selector: Option<String>,

    /// Show detailed output including debug logs
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Save the page's ranking table as a new snapshot and make it the baseline
    Save(PageArgs),

    /// Annotate the page against the baseline snapshot
    Annotate(AnnotateArgs),

    /// Keep re-annotating the page whenever it changes
    Watch(WatchArgs),

    /// List stored snapshots, newest first
    List,

    /// Use a stored snapshot as baseline
    Apply(IdArgs),

    /// Delete a stored snapshot
    Delete(IdArgs),

    /// Delete every snapshot and the baseline
    Clear(ClearArgs),

    /// Show the current baseline and snapshot count
    Status,
}

#[derive(Parser)]
pub struct PageArgs {
    /// HTML file holding the rendered page
    pub page: PathBuf,

    /// Write the annotated page here
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
pub struct AnnotateArgs {
    #[command(flatten)]
    pub page: PageArgs,

    /// Output as JSON instead of table
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Hide deltas and former names in the annotated page
    #[arg(long, default_value_t = false, conflicts_with = "show_diffs")]
    pub hide_diffs: bool,

    /// Show deltas and former names again on a page where they were hidden
    #[arg(long, default_value_t = false)]
    pub show_diffs: bool,
}

impl AnnotateArgs {
    /// Requested annotation visibility. `None` keeps what the page already has.
    pub fn diffs_hidden(&self) -> Option<bool> {
        if self.hide_diffs {
            Some(true)
        } else if self.show_diffs {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Parser)]
pub struct WatchArgs {
    /// HTML file rewritten by the page's owner
    pub page: PathBuf,

    /// Annotated page is written here
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// How often the page file is checked, e.g. "250ms"
    #[arg(long)]
    pub interval: Option<humantime::Duration>,
}

#[derive(Parser)]
pub struct IdArgs {
    /// Snapshot ID as shown by `rankscan list`
    pub id: String,
}

#[derive(Parser)]
pub struct ClearArgs {
    /// Skip confirmation
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}
