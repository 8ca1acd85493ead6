//! Shared types and remote interfaces for the mediarelay pipeline.
//!
//! Everything that crosses a crate boundary lives here: protocol constants,
//! the [`MediaKind`] attribute table, upload artifacts, delivery
//! acknowledgements, and the traits the integrator implements to bridge the
//! pipeline to a concrete chunked-upload / messaging backend.

pub mod constants;
pub mod media;
pub mod remote;
pub mod types;

// Re-export primary types for convenience.
pub use media::{KindTraits, MediaAttribute, MediaKind};
pub use remote::{
    ArtifactFinalizer, DeliveryTransport, RemoteError, RemoteFuture, StatusSink, UploadTransport,
};
pub use types::{DeliveryAck, MediaRef, RecipientId, UploadMode, UploadedArtifact};
