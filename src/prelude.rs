//! Prelude module for convenient imports.
//!
//! # Example
//!
//! ```rust,ignore
//! use fs_churn::prelude::*;
//! ```

pub use crate::churn::{
    Action, ChurnError, ChurnOptions, ChurnRequest, ControlError, Controller, ControllerOptions,
    RunLimit, RunSummary, StopHandle, Tunables, WeightTable, run,
};
