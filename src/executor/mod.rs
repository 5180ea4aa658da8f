//! Parallel miner execution: fan out over the configured devices, keep the
//! first answer, terminate the rest.
//!
//! One joinable worker thread per device, each blocking on its own child
//! process. The first worker to produce an answer wins an atomic flag,
//! publishes through a channel, and flips the shared stop token so every
//! sibling kills its child. A round where nobody wins is a normal miss,
//! not an error; only calling `run` on a busy executor is.

pub mod process;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::model::{Answer, MinerTask};
use process::{ExecOutcome, MinerProcess};

/// What one executor round produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    /// The published answer, if any worker found one.
    pub answer: Option<Answer>,
    pub crashes: usize,
    pub timeouts: usize,
}

pub struct TaskExecutor {
    miner_path: PathBuf,
    work_dir: PathBuf,
    boost_factor: u32,
    running: AtomicBool,
    /// Stop token of the in-flight run, if any.
    current_stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl TaskExecutor {
    pub fn new(cfg: &Config) -> Self {
        let work_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_work_dir(cfg.miner_path.clone(), work_dir, cfg.boost_factor)
    }

    /// The working directory is where every child writes its artifact;
    /// injectable so tests can isolate rounds from each other.
    pub fn with_work_dir(miner_path: PathBuf, work_dir: PathBuf, boost_factor: u32) -> Self {
        Self {
            miner_path,
            work_dir,
            boost_factor,
            running: AtomicBool::new(false),
            current_stop: Mutex::new(None),
        }
    }

    /// Run one task across all its devices and wait for the round to
    /// settle. At most one run may be in flight per executor.
    pub fn run(&self, miner_task: &MinerTask) -> Result<ExecReport, String> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err("run called on an already running executor".into());
        }

        let stop = Arc::new(AtomicBool::new(false));
        *self.current_stop.lock().unwrap() = Some(stop.clone());

        let found = Arc::new(AtomicBool::new(false));
        let crashes = Arc::new(AtomicUsize::new(0));
        let timeouts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<Answer>();

        let mut workers = Vec::with_capacity(miner_task.devices.len());
        for &device in &miner_task.devices {
            info!("starting miner for GPU #{}", device);
            let miner = MinerProcess::new(
                self.miner_path.clone(),
                self.work_dir.clone(),
                self.boost_factor,
                device,
                stop.clone(),
            );
            let task = miner_task.clone();
            let tx = tx.clone();
            let found = found.clone();
            let stop = stop.clone();
            let crashes = crashes.clone();
            let timeouts = timeouts.clone();
            workers.push(thread::spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| miner.run(&task)))
                    .unwrap_or_else(|_| ExecOutcome::Crash {
                        msg: "unknown".into(),
                        code: 0,
                    });
                match outcome {
                    ExecOutcome::Timeout => {
                        info!("miner #{} timed out", device);
                        timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    // Preempted workers are neither crashes nor timeouts;
                    // they must not feed the caller's retry accounting.
                    ExecOutcome::Stopped => {
                        info!("miner #{} stopped", device);
                    }
                    ExecOutcome::Crash { msg, code } => {
                        warn!("miner #{} crashed: {} (code {})", device, msg, code);
                        crashes.fetch_add(1, Ordering::Relaxed);
                    }
                    ExecOutcome::Found(answer) => {
                        // Exactly one worker publishes; latecomers drop
                        // their result.
                        if found.swap(true, Ordering::SeqCst) {
                            return;
                        }
                        info!("miner #{} found an answer", device);
                        let _ = tx.send(answer);
                        stop.store(true, Ordering::SeqCst);
                    }
                }
            }));
        }
        drop(tx);

        // Unblocks on the first published answer, or when the last worker
        // hangs up without one.
        let answer = rx.recv().ok();
        stop.store(true, Ordering::SeqCst);
        for worker in workers {
            let _ = worker.join();
        }
        debug!("all miner workers finished");

        *self.current_stop.lock().unwrap() = None;
        self.running.store(false, Ordering::SeqCst);

        Ok(ExecReport {
            answer,
            crashes: crashes.load(Ordering::Relaxed),
            timeouts: timeouts.load(Ordering::Relaxed),
        })
    }

    /// Preempt an in-flight run; a no-op when idle. The interrupted
    /// workers kill their children, report them as stopped, and `run`
    /// returns through its normal cleanup path.
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        debug!("stopping executor");
        if let Some(stop) = self.current_stop.lock().unwrap().as_ref() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}
