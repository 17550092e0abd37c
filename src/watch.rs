//! Watching a page file that another program keeps re-rendering.
//!
//! Each poll compares the file with what was last seen; a difference counts as
//! a page mutation and goes to the [`ChangeMonitor`]. When the monitor fires,
//! the page is parsed, annotated against the baseline and written to the
//! output file. The output is only rewritten when its bytes change, so
//! watching a file and writing back into it settles after one extra pass.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::monitor::{ChangeMonitor, MutationOutcome};
use crate::page::{html, PageError};
use crate::pipeline::{self, PassOutcome};
use crate::store::{Persistence, SnapshotStore};

/// Read access to the rendered page.
pub trait PageSource {
    /// Current page markup. `None` when the page cannot be read right now.
    fn read(&mut self) -> Option<String>;
}

pub struct FilePage {
    path: PathBuf,
}

impl FilePage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePage { path: path.into() }
    }
}

impl PageSource for FilePage {
    fn read(&mut self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "page not readable");
                None
            }
        }
    }
}

pub struct Watcher<S: PageSource, P: Persistence> {
    source: S,
    store: SnapshotStore<P>,
    monitor: ChangeMonitor,
    output: PathBuf,
    content_selector: String,
    last_seen: Option<String>,
    last_written: Option<String>,
}

impl<S: PageSource, P: Persistence> Watcher<S, P> {
    pub fn new(
        source: S,
        store: SnapshotStore<P>,
        monitor: ChangeMonitor,
        output: &Path,
        content_selector: &str,
    ) -> Self {
        Watcher {
            source,
            store,
            monitor,
            output: output.to_path_buf(),
            content_selector: content_selector.to_string(),
            last_seen: None,
            last_written: None,
        }
    }

    pub fn monitor(&self) -> &ChangeMonitor {
        &self.monitor
    }

    /// Poll the page once and run a pass if the monitor says one is due.
    pub fn tick(&mut self, now: Instant) -> Result<Option<PassOutcome>, PageError> {
        if let Some(content) = self.source.read() {
            if self.last_seen.as_deref() != Some(content.as_str()) {
                let first = self.last_seen.is_none();
                self.last_seen = Some(content);
                if first {
                    self.monitor.request_now(now);
                } else {
                    match self.monitor.on_mutation(now) {
                        MutationOutcome::Scheduled(at) => debug!(?at, "page changed, rerun scheduled"),
                        dropped => debug!(?dropped, "page change ignored"),
                    }
                }
            }
        }

        if !self.monitor.is_due(now) {
            return Ok(None);
        }
        let Some(content) = self.last_seen.clone() else {
            return Ok(None);
        };

        let Self {
            monitor,
            store,
            output,
            content_selector,
            last_written,
            ..
        } = self;

        let pass = || -> Result<PassOutcome, PageError> {
            let mut doc = html::parse(&content, content_selector)?;
            let outcome = pipeline::run_pass(&mut doc, store);
            if let PassOutcome::Annotated(_) = outcome {
                let rendered = html::render(&doc);
                if last_written.as_deref() != Some(rendered.as_str()) {
                    std::fs::write(&*output, &rendered)?;
                    *last_written = Some(rendered);
                    info!(output = %output.display(), "annotated page written");
                }
            }
            Ok(outcome)
        };

        monitor.run_if_due(now, pass, Instant::now).transpose()
    }
}

/// Watch until the process is stopped.
pub fn run<S: PageSource, P: Persistence>(
    mut watcher: Watcher<S, P>,
    poll_interval: Duration,
) -> Result<(), PageError> {
    loop {
        match watcher.tick(Instant::now()) {
            Ok(Some(outcome)) => info!(%outcome, "pass complete"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "pass failed"),
        }
        std::thread::sleep(poll_interval);
    }
}
