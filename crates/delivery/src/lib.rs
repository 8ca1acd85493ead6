//! Delivery of uploaded artifacts to a recipient.
//!
//! This crate holds the fan-out logic only; the integrator provides a
//! [`DeliveryTransport`](mediarelay_protocol::DeliveryTransport) bridging to
//! the actual messaging backend.
//!
//! # Flow
//!
//! 1. **Plan**: partition items by kind, chunk groupable kinds into batches
//! 2. **Send**: one group send per batch, single sends otherwise
//! 3. **Reconcile**: record acknowledged items, fall back to single sends
//!    when a group send fails outright
//! 4. **Safety net**: after a cooldown, resend every item still missing

pub mod batch;
pub mod coordinator;
pub mod types;

pub use batch::{Batch, plan_batches};
pub use coordinator::DeliveryCoordinator;
pub use types::{DeliveredSet, DeliveryConfig, DeliveryEvent, DeliveryItem, DeliveryReport};
