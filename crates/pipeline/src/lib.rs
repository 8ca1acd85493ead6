//! End-to-end relay flow.
//!
//! Ties the transfer and delivery crates together behind one entry point,
//! [`RelayPipeline::run`]. The integrator supplies the remote endpoints as
//! trait objects from `mediarelay-protocol`.
//!
//! # Flow
//!
//! 1. **Admit**: one active transfer per requester
//! 2. **Check**: reject files above the size ceiling
//! 3. **Upload**: per file, relay and upload with a fresh source on each attempt
//! 4. **Finalize**: turn each uploaded artifact into a deliverable reference
//! 5. **Deliver**: batched fan-out with a final safety net

pub mod admission;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

pub use admission::{AdmissionControl, TransferGuard};
pub use config::RelayConfig;
pub use error::PipelineError;
pub use pipeline::{RelayPipeline, SENDING_TEXT};
pub use types::{FileJob, RelayOutcome, SkippedFile, TransferRequest};
