use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

use crate::repository::{ComposerRepository, RemoteState};

/// Granularity at which a sleeping poller notices a stop request
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Handle on the background polling thread
pub struct Poller {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Poller {
    /// Spawn a thread running `update` every `interval`.
    ///
    /// The interval is measured from the end of one cycle to the start of the
    /// next, so cycles never overlap.
    pub fn spawn<R>(repository: ComposerRepository<R>, interval: Duration) -> Result<Self>
    where
        R: RemoteState + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("composer-poller".to_string())
                .spawn(move || run(&repository, interval, &stop))
                .context("Failed to spawn poller thread")?
        };
        Ok(Self { stop, handle })
    }

    /// Ask the poller to exit after the current cycle and wait for it
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            tracing::error!("Poller thread panicked");
        }
    }
}

fn run<R: RemoteState>(repository: &ComposerRepository<R>, interval: Duration, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        poll_once(repository);

        let deadline = Instant::now() + interval;
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(STOP_CHECK_INTERVAL.min(deadline - now));
        }
    }
    tracing::debug!("Poller stopped");
}

/// Run a single cycle, logging the outcome. Errors never escape.
pub fn poll_once<R: RemoteState>(repository: &ComposerRepository<R>) {
    tracing::info!("Fetching data...");
    let started = Instant::now();
    match repository.update() {
        Ok(summary) => tracing::info!(
            projects = summary.projects_seen,
            refreshed = summary.projects_refreshed,
            failed = summary.projects_failed,
            references = summary.references_refreshed,
            references_failed = summary.references_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Update finished"
        ),
        Err(e) => tracing::error!("Update failed: {e:#}"),
    }
}
