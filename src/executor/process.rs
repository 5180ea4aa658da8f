//! One miner child bound to one device.
//!
//! The child gets the task encoded into its argv, writes `mined.boc` into
//! the working directory on success and exits zero. Everything it does is
//! opaque beyond that contract; stdout/stderr are captured for the logs
//! only. The caller sees exactly one of three outcomes and never a panic.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use tracing::{debug, info};

use crate::model::{Answer, MinerTask};

/// Fixed artifact file name. Every child of a round writes the same file;
/// the winner's bytes are already in memory before a loser can overwrite.
pub const RESULT_FILE: &str = "mined.boc";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bound on waiting for a killed child to be reaped. A zombie is better
/// than a worker that never comes back.
const REAP_GRACE: Duration = Duration::from_secs(1);

/// Terminal outcome of one miner child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Deadline hit with the child still running.
    Timeout,
    /// Killed because the round was preempted: a sibling won or the
    /// executor was stopped. Not a miner fault.
    Stopped,
    /// Non-zero exit, spawn/read failure, or a missing artifact.
    Crash { msg: String, code: i32 },
    /// Exit zero and the artifact was read back.
    Found(Answer),
}

pub struct MinerProcess {
    miner_path: PathBuf,
    work_dir: PathBuf,
    boost_factor: u32,
    device: u32,
    /// Shared per-round stop token; set by the executor when a sibling
    /// wins or the run is preempted.
    stop: Arc<AtomicBool>,
}

impl MinerProcess {
    pub fn new(
        miner_path: PathBuf,
        work_dir: PathBuf,
        boost_factor: u32,
        device: u32,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            miner_path,
            work_dir,
            boost_factor,
            device,
            stop,
        }
    }

    /// Drive one miner child to completion. Infallible from the caller's
    /// point of view: every failure folds into `Crash`.
    pub fn run(&self, task: &MinerTask) -> ExecOutcome {
        match self.exec(task) {
            Ok(outcome) => outcome,
            Err(msg) => ExecOutcome::Crash { msg, code: 0 },
        }
    }

    /// The miner argv, built as one space-separated line and then split on
    /// whitespace runs.
    fn build_args(&self, task: &MinerTask) -> Result<Vec<String>, String> {
        let seed = hex_to_decimal(&task.task.seed)?;
        let complexity = hex_to_decimal(&task.task.complexity)?;
        let line = format!(
            "-vv -g {} -F {} -e {} {} {} {} {} {} {}",
            self.device,
            self.boost_factor,
            task.task.expires,
            task.task.pool_address,
            seed,
            complexity,
            task.iterations,
            task.task.giver_address,
            RESULT_FILE,
        );
        Ok(line.split_whitespace().map(String::from).collect())
    }

    fn exec(&self, task: &MinerTask) -> Result<ExecOutcome, String> {
        let args = self.build_args(task)?;
        info!("miner #{} args: {}", self.device, args.join(" "));

        let mut child = Command::new(&self.miner_path)
            .args(&args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("can't spawn {}: {}", self.miner_path.display(), e))?;

        // Drain both pipes while the child runs; a full pipe would stall
        // the miner mid-search.
        let stdout = capture_pipe(child.stdout.take());
        let stderr = capture_pipe(child.stderr.take());

        let deadline = UNIX_EPOCH + Duration::from_secs(task.task.expires.max(0) as u64);

        let status = loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| format!("can't wait for the miner: {}", e))?
            {
                break status;
            }
            if SystemTime::now() >= deadline {
                kill_and_reap(&mut child);
                return Ok(ExecOutcome::Timeout);
            }
            if self.stop.load(Ordering::Relaxed) {
                kill_and_reap(&mut child);
                return Ok(ExecOutcome::Stopped);
            }
            thread::sleep(POLL_INTERVAL);
        };

        info!("miner #{} stdout:\n{}", self.device, join_capture(stdout));
        info!("miner #{} stderr:\n{}", self.device, join_capture(stderr));

        let code = status.code().unwrap_or(-1);
        if code != 0 {
            return Ok(ExecOutcome::Crash {
                msg: "non-zero exit code".into(),
                code,
            });
        }

        let result_path = self.work_dir.join(RESULT_FILE);
        debug!("checking {} for an answer", result_path.display());
        if !result_path.exists() {
            return Ok(ExecOutcome::Crash {
                msg: "can't locate boc file".into(),
                code: -1,
            });
        }
        let boc = fs::read(&result_path)
            .map_err(|e| format!("can't read {}: {}", result_path.display(), e))?;

        Ok(ExecOutcome::Found(Answer {
            giver_address: task.task.giver_address.clone(),
            boc,
            statistic: None,
        }))
    }
}

/// Re-encode a hex big integer as decimal for the miner's argv. The pool
/// hands seeds and complexities out in base 16; the miner wants base 10.
fn hex_to_decimal(raw: &str) -> Result<String, String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .map(|n| n.to_str_radix(10))
        .ok_or_else(|| format!("can't parse {:?} as a hex big integer", raw))
}

fn capture_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = reader.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_capture(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let start = Instant::now();
    while start.elapsed() < REAP_GRACE {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => return,
            Ok(None) => thread::sleep(POLL_INTERVAL),
        }
    }
    debug!("miner child was not reaped within the grace period");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn stub_miner(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("stub-miner.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn task_expiring_in(secs: i64) -> MinerTask {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        MinerTask::new(
            Task {
                seed: "ab".into(),
                complexity: "10".into(),
                giver_address: "giver".into(),
                pool_address: "pool".into(),
                expires: now + secs,
            },
            1000,
            vec![0],
        )
    }

    fn process(miner: PathBuf, dir: &Path) -> MinerProcess {
        MinerProcess::new(
            miner,
            dir.to_path_buf(),
            64,
            0,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_hex_to_decimal() {
        assert_eq!(hex_to_decimal("ff").unwrap(), "255");
        assert_eq!(hex_to_decimal("0xff").unwrap(), "255");
        assert_eq!(hex_to_decimal("10").unwrap(), "16");
        assert!(hex_to_decimal("not-hex").is_err());
        assert!(hex_to_decimal("").is_err());
    }

    #[test]
    fn test_argv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let proc = MinerProcess::new(
            "pow-miner-cuda".into(),
            dir.path().to_path_buf(),
            64,
            3,
            Arc::new(AtomicBool::new(false)),
        );
        let mut task = task_expiring_in(0);
        task.task.expires = 1234;
        task.iterations = 77;
        let args = proc.build_args(&task).unwrap();
        assert_eq!(
            args,
            vec![
                "-vv", "-g", "3", "-F", "64", "-e", "1234", "pool", "171", "16", "77", "giver",
                "mined.boc"
            ]
        );
    }

    #[test]
    fn test_malformed_seed_is_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let miner = stub_miner(dir.path(), "exit 0");
        let mut task = task_expiring_in(30);
        task.task.seed = "xyz".into();
        match process(miner, dir.path()).run(&task) {
            ExecOutcome::Crash { code, .. } => assert_eq!(code, 0),
            other => panic!("expected Crash, got {:?}", other),
        }
    }

    #[test]
    fn test_success_reads_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let miner = stub_miner(dir.path(), "printf XYZ > mined.boc");
        match process(miner, dir.path()).run(&task_expiring_in(30)) {
            ExecOutcome::Found(answer) => {
                assert_eq!(answer.boc, b"XYZ");
                assert_eq!(answer.giver_address, "giver");
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_nonzero_exit_is_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let miner = stub_miner(dir.path(), "exit 3");
        match process(miner, dir.path()).run(&task_expiring_in(30)) {
            ExecOutcome::Crash { msg, code } => {
                assert_eq!(code, 3);
                assert!(msg.contains("non-zero"));
            }
            other => panic!("expected Crash, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_artifact_is_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let miner = stub_miner(dir.path(), "exit 0");
        match process(miner, dir.path()).run(&task_expiring_in(30)) {
            ExecOutcome::Crash { msg, code } => {
                assert_eq!(code, -1);
                assert!(msg.contains("boc"));
            }
            other => panic!("expected Crash, got {:?}", other),
        }
    }

    #[test]
    fn test_deadline_terminates_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let miner = stub_miner(dir.path(), "sleep 5");
        let start = Instant::now();
        let outcome = process(miner, dir.path()).run(&task_expiring_in(1));
        assert_eq!(outcome, ExecOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_millis(2500));
    }

    #[test]
    fn test_spawn_failure_is_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-miner");
        match process(missing, dir.path()).run(&task_expiring_in(30)) {
            ExecOutcome::Crash { msg, code } => {
                assert_eq!(code, 0);
                assert!(msg.contains("spawn"));
            }
            other => panic!("expected Crash, got {:?}", other),
        }
    }
}
