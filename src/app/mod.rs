//! The supervision loop: register once, then request a task, run the
//! miners, submit whatever they found, forever.
//!
//! Transport failures are fatal in this revision — the pool refusing us
//! means there is nothing sensible to retry against. An empty mining
//! round is not: the loop just asks for the next task. A miner binary
//! that crashes on every device round after round is treated as broken
//! and also brings the process down.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::client::PoolClient;
use crate::config::Config;
use crate::executor::TaskExecutor;
use crate::model::{MinerTask, Statistic};

/// Consecutive all-crash rounds tolerated before giving up on the miner.
const MAX_CONSECUTIVE_CRASH_ROUNDS: u32 = 5;

pub struct App {
    executor: Arc<TaskExecutor>,
    running: AtomicBool,
    answers_found: AtomicU32,
}

impl App {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self {
            executor,
            running: AtomicBool::new(false),
            answers_found: AtomicU32::new(0),
        }
    }

    /// Run the task loop until `stop` is called or a fatal failure hits.
    /// Returns the process exit code.
    pub async fn run(&self, cfg: &Config, client: &dyn PoolClient) -> i32 {
        if self.running.swap(true, Ordering::SeqCst) {
            error!("app is already running");
            return 1;
        }
        info!("starting with {}", cfg);

        let Some(user) = client.register().await else {
            error!("registration failed, inspect logs for details");
            return 1;
        };
        info!(
            "registered as {} (pool {}, shares: {})",
            user.user_address, user.pool_address, user.shares
        );

        let mut crash_rounds: u32 = 0;
        while self.running.load(Ordering::SeqCst) {
            debug!("requesting a new task");
            let Some(task) = client.get_task().await else {
                error!("can't get a new task from the server, inspect logs for details");
                return 1;
            };
            debug!("got task: {:?}", task);

            let miner_task = MinerTask::new(task, cfg.iterations, cfg.devices.clone());
            let executor = self.executor.clone();
            let round = tokio::task::spawn_blocking(move || executor.run(&miner_task)).await;
            self.executor.stop();

            let report = match round {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!("executor refused the run: {}", e);
                    return 1;
                }
                Err(e) => {
                    error!("executor task failed: {}", e);
                    return 1;
                }
            };

            let Some(answer) = report.answer else {
                // A round cut short by stop() must not trip the crash
                // limit on the way out.
                if !self.running.load(Ordering::SeqCst) {
                    continue;
                }
                if report.crashes > 0 && report.timeouts == 0 {
                    crash_rounds += 1;
                    if crash_rounds > MAX_CONSECUTIVE_CRASH_ROUNDS {
                        error!(
                            "every miner crashed {} rounds in a row, giving up",
                            crash_rounds
                        );
                        return 1;
                    }
                } else {
                    crash_rounds = 0;
                }
                debug!(
                    "no answer this round ({} crashed, {} timed out), requesting a new task",
                    report.crashes, report.timeouts
                );
                continue;
            };
            crash_rounds = 0;

            self.log_statistic(answer.statistic);
            debug!("sending answer for giver {}", answer.giver_address);
            let Some(status) = client.send_answer(&answer).await else {
                error!("can't send the answer, inspect logs for details");
                return 1;
            };
            info!(
                "answer {}",
                if status.accepted { "accepted" } else { "declined" }
            );
        }

        info!("orderly stop");
        0
    }

    fn log_statistic(&self, statistic: Option<Statistic>) {
        let count = self.answers_found.fetch_add(1, Ordering::Relaxed) + 1;
        match statistic {
            Some(mut st) => {
                st.count = count;
                match serde_json::to_string(&st) {
                    Ok(json) => info!("statistic: {}", json),
                    Err(e) => warn!("can't encode statistic: {}", e),
                }
            }
            None => debug!("no statistic collected for answer #{}", count),
        }
    }

    /// Flag the loop to exit and preempt the in-flight executor run. The
    /// loop finishes its current iteration's cleanup and returns 0.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stop requested");
        self.executor.stop();
    }
}
