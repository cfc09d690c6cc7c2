//! Background hole fill.
//!
//! [`FillWorkers`] drains the hole lists of a set of open handles on a
//! bounded pool of OS threads, so the destination becomes self-sufficient
//! without waiting for foreground reads to touch every range. Workers share
//! the handles with the foreground through `Arc`; each promotion holds the
//! handle's own lock, so foreground I/O interleaves between chunks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::debug;

use crate::error::Result;
use crate::fs::LiveRestoreFs;
use crate::handle::LiveRestoreFile;
use crate::os::OsFilesystem;

/// A running pool of background fill workers.
pub struct FillWorkers {
    workers: Vec<thread::JoinHandle<Result<()>>>,
}

impl FillWorkers {
    /// Spawn up to [`threads_max`](LiveRestoreFs::threads_max) workers that
    /// drain the hole lists of `files` and exit.
    ///
    /// Workers pull whole files off a shared queue; a file's holes are
    /// promoted in chunks by [`LiveRestoreFile::fill_holes`], which aborts
    /// early when the mount's panic flag is set.
    pub fn spawn<S: OsFilesystem>(
        fs: &LiveRestoreFs<S>,
        files: Vec<Arc<LiveRestoreFile<S>>>,
    ) -> Result<Self> {
        let worker_count = fs.threads_max().min(files.len()).max(1);
        let queue = Arc::new(Mutex::new(VecDeque::from(files)));

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("live-restore-fill-{index}"))
                .spawn(move || {
                    loop {
                        let next = queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pop_front();
                        let Some(file) = next else {
                            return Ok(());
                        };
                        debug!(name = %file.name().display(), "background fill");
                        file.fill_holes()?;
                    }
                })?;
            workers.push(handle);
        }
        Ok(Self { workers })
    }

    /// Wait for every worker, returning the first error any of them hit.
    pub fn join(self) -> Result<()> {
        let mut first_err = None;
        for worker in self.workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
