//! Background flusher
//!
//! Periodically fsyncs the log from a dedicated thread when the sync
//! strategy is `Interval`. The thread owns a duplicate handle of the log
//! file and stops on an explicit signal: `FlushHandle::stop` disconnects
//! the stop channel and joins the thread, so once it returns no further
//! fsync can run.

use std::fs::File;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{DbError, Result};

/// Handle to a running flusher thread.
/// Dropping this handle stops the thread and waits for it.
#[derive(Debug)]
pub struct FlushHandle {
    /// Dropping the sender is the stop signal
    stop: Option<Sender<()>>,
    /// Background thread join handle
    thread: Option<thread::JoinHandle<()>>,
}

impl FlushHandle {
    /// Signal the thread to stop and wait until it has exited.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Check if the flusher thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the flusher thread for `file`.
///
/// # Arguments
/// * `path` - Log path (thread name and log fields only)
/// * `file` - Open log file; duplicated so the caller keeps its handle
/// * `interval` - Time between fsyncs
pub fn start_flusher(path: PathBuf, file: &File, interval: Duration) -> Result<FlushHandle> {
    let file = file.try_clone().map_err(|source| DbError::Open {
        path: path.clone(),
        source,
    })?;
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);

    let thread_path = path.clone();
    let thread = thread::Builder::new()
        .name("bucketdb-flusher".to_string())
        .spawn(move || flush_loop(thread_path, file, interval, stop_rx))
        .map_err(|source| DbError::Open { path, source })?;

    Ok(FlushHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    })
}

/// Main flusher loop, runs on the background thread.
fn flush_loop(path: PathBuf, file: File, interval: Duration, stop: Receiver<()>) {
    let ticker = channel::tick(interval);
    debug!(path = %path.display(), interval_ms = interval.as_millis() as u64, "flusher started");

    loop {
        crossbeam::select! {
            // Any message or a disconnect means stop
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                if let Err(e) = file.sync_all() {
                    warn!(path = %path.display(), error = %e, "periodic fsync failed, flusher exiting");
                    break;
                }
            }
        }
    }

    debug!(path = %path.display(), "flusher stopped");
}
