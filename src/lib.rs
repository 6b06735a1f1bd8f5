//! # fs-churn
//!
//! `fs-churn` keeps a directory tree under randomized, reproducible change. It is organized around:
//! - `churn::worker`: one random walker that creates, rewrites and removes its own entries
//! - `churn::driver`: wave scheduling of all workers until a limit or a stop signal
//! - `churn::runner`: the embedded `run(path, duration, options)` entry point
//! - `churn::engine` / `churn::controller`: a host/engine control protocol for running the churn
//!   in a separate task or process
//!
//! Workers only ever touch entries whose names start with their own prefix, so churn can run
//! against a directory that other code is watching or scanning.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod churn;
pub mod prelude;

#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod logging;
