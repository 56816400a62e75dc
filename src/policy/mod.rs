//! Deployment policy evaluated per response: embedding headers and the
//! remote image allow-list.

pub mod embedding;
pub mod image;

pub use embedding::{EmbeddingPolicy, FrameAncestors, frame_ancestors_directive};
pub use image::{ImagePolicy, Protocol, RemotePattern};
