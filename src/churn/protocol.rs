//! Messages exchanged between a supervising host and a churn engine.
//!
//! On a byte transport every message is one JSON object per line, tagged by `"type"`.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Host to engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    /// Configure the next run. Ignored while a run is active.
    Setup {
        /// Directory to churn.
        path: PathBuf,
        /// Seed; drawn from system randomness when absent. A fractional seed (as produced by
        /// `Math.random()` hosts) is accepted and mapped to its IEEE-754 bit pattern.
        #[serde(
            default,
            deserialize_with = "seed_from_number",
            skip_serializing_if = "Option::is_none"
        )]
        seed: Option<u64>,
        /// Worker count; 4 when absent.
        #[serde(
            default,
            rename = "workerCount",
            skip_serializing_if = "Option::is_none"
        )]
        worker_count: Option<usize>,
    },
    /// Begin the configured run. No-op without a prior setup or while running.
    Start,
    /// Gracefully stop the active run.
    Stop,
}

fn seed_from_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seed {
        Whole(u64),
        Fractional(f64),
    }

    Ok(Option::<Seed>::deserialize(deserializer)?.map(|seed| match seed {
        Seed::Whole(seed) => seed,
        Seed::Fractional(seed) => seed.to_bits(),
    }))
}

/// Engine to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineMessage {
    /// All workers are idle and the run loop has exited.
    Stopped,
    /// One log line (an action or an error).
    Log {
        /// Log text.
        #[serde(rename = "msg")]
        message: String,
    },
}

impl EngineMessage {
    /// Log message helper.
    pub fn log(message: impl Into<String>) -> Self {
        EngineMessage::Log {
            message: message.into(),
        }
    }
}

/// Encode one message as a newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line; surrounding whitespace is ignored.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim())
}
