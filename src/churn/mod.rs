//! Randomized filesystem churn: workers, the wave driver, and the host/engine control protocol.

pub mod action;
pub mod config;
pub mod controller;
pub mod driver;
pub mod engine;
pub mod events;
pub mod protocol;
pub mod runner;
pub mod selector;
pub mod words;
pub mod worker;

pub use action::{Action, WeightTable};
pub use config::{ChurnConfig, ConfigError, DEFAULT_WORKER_COUNT, Tunables};
pub use controller::{ControlError, Controller, ControllerOptions};
pub use driver::{ChurnError, Driver, RunLimit, RunSummary, StopHandle, validate_root};
pub use engine::{Engine, serve_lines};
pub use events::{ChurnEvent, LogRelay, display_relative};
pub use protocol::{EngineMessage, HostMessage, decode_line, encode_line};
pub use runner::{ChurnOptions, ChurnRequest, run};
pub use selector::WeightedSelector;
pub use worker::{Worker, WorkerError, WorkerState};
