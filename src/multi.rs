//! Parallel multi-remote fetch driver.
//!
//! One FETCH_HEAD truncation up front, followed by a pool of workers
//! that each run a full single-remote fetch and append their own lines,
//! with the overall operation failing if any worker failed. Grounded on
//! `radicle-node`'s `worker::Pool`: a small, bounded
//! pool of OS threads pulling jobs off a `crossbeam_channel`, rather than
//! spawning one thread per remote unconditionally.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, Sender};

/// One remote's fetch, already closed over its own transport and object
/// store. Boxed so the pool can be generic over however many different
/// `Transport`/`ObjectStore` concretizations the caller is juggling
/// across remotes.
pub type FetchJob = Box<dyn FnOnce() -> Result<crate::orchestrator::FetchSummary, String> + Send>;

pub struct NamedJob {
    pub remote_name: Box<str>,
    pub job: FetchJob,
}

pub struct JobOutcome {
    pub remote_name: Box<str>,
    pub result: Result<crate::orchestrator::FetchSummary, String>,
}

pub struct MultiFetchOutcome {
    pub outcomes: Vec<JobOutcome>,
}

impl MultiFetchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.result.as_ref().is_ok_and(|s| s.is_success()))
    }
}

/// Truncates FETCH_HEAD once, then runs `jobs` across a pool of
/// `max(1, parallelism)` worker threads. Each job is expected to open its
/// own `FetchHeadWriter` in append mode, so lines from concurrent workers
/// interleave by append order rather than clobbering each other.
pub fn fetch_all(fetch_head_path: &Path, parallelism: usize, jobs: Vec<NamedJob>) -> io::Result<MultiFetchOutcome> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(fetch_head_path)?;

    let worker_count = parallelism.max(1).min(jobs.len().max(1));
    let (job_tx, job_rx) = bounded::<NamedJob>(jobs.len());
    let (result_tx, result_rx) = bounded::<JobOutcome>(jobs.len());

    for job in jobs {
        job_tx.send(job).expect("job channel has capacity for every job");
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx: Sender<JobOutcome> = result_tx.clone();
            scope.spawn(move || {
                while let Ok(NamedJob { remote_name, job }) = job_rx.recv() {
                    let result = job();
                    let _ = result_tx.send(JobOutcome { remote_name, result });
                }
            });
        }
        drop(result_tx);
    });

    let outcomes = result_rx.iter().collect();
    Ok(MultiFetchOutcome { outcomes })
}
