//! Records exchanged with the pool server and their JSON wire format.
//!
//! Wire quirks, pinned by the server:
//!   - `Task.expires` is a decimal string on the wire but an `i64`
//!     (Unix seconds) in memory.
//!   - `Answer.boc` travels base64-encoded (RFC 4648) under `"boc_data"`.
//!   - `AnswerStatus` is the string enum `ACCEPTED`/`DECLINED`; anything
//!     the server invents later is read as not-accepted.
//!
//! Decoders ignore unknown fields. A missing required field fails the
//! decode, which the client layer reports as a failed call.

use serde::{Deserialize, Serialize};

/// Registration record returned by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub pool_address: String,
    pub user_address: String,
    pub shares: i64,
}

/// Mining assignment issued by the pool.
///
/// `seed` and `complexity` are hex-encoded big integers; they stay as
/// strings here and are re-encoded to decimal only when the miner argv is
/// built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub seed: String,
    pub complexity: String,
    pub giver_address: String,
    pub pool_address: String,
    /// Absolute wall-clock deadline, Unix seconds. All work on this task
    /// must be dead by this instant.
    #[serde(with = "expires_string")]
    pub expires: i64,
}

mod expires_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<i64>()
            .map_err(|_| de::Error::custom(format!("expires is not a decimal string: {:?}", raw)))
    }
}

/// A pool task plus the local execution parameters attached to it.
/// Built per round, consumed by one executor run, then discarded.
#[derive(Debug, Clone)]
pub struct MinerTask {
    pub task: Task,
    /// Work cap handed to the miner as its iteration budget.
    pub iterations: u64,
    /// Devices to fan out over; non-empty, deduplicated, order preserved.
    pub devices: Vec<u32>,
}

impl MinerTask {
    pub fn new(task: Task, iterations: u64, devices: Vec<u32>) -> Self {
        Self {
            task,
            iterations,
            devices,
        }
    }
}

/// Local mining counters, logged when an answer is found. Never serialized
/// into the answer body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistic {
    pub count: u32,
    pub rate: u64,
}

/// Proof artifact submitted back to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub giver_address: String,
    #[serde(rename = "boc_data", with = "boc_base64")]
    pub boc: Vec<u8>,
    #[serde(skip)]
    pub statistic: Option<Statistic>,
}

mod boc_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD
            .decode(raw.as_bytes())
            .map_err(|e| de::Error::custom(format!("boc_data is not valid base64: {}", e)))
    }
}

const STATUS_ACCEPTED: &str = "ACCEPTED";
const STATUS_DECLINED: &str = "DECLINED";

/// The pool's verdict on a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerStatus {
    pub accepted: bool,
}

#[derive(Serialize, Deserialize)]
struct AnswerStatusWire {
    status: String,
}

impl Serialize for AnswerStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let status = if self.accepted {
            STATUS_ACCEPTED
        } else {
            STATUS_DECLINED
        };
        AnswerStatusWire {
            status: status.to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AnswerStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = AnswerStatusWire::deserialize(deserializer)?;
        Ok(AnswerStatus {
            accepted: wire.status == STATUS_ACCEPTED,
        })
    }
}
