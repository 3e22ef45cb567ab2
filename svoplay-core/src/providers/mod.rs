//! Bundled capture providers.
//!
//! Neither decodes a proprietary container; they stand in for a vendor SDK
//! behind the same [`CaptureProvider`](crate::provider::CaptureProvider) trait.

pub mod image_sequence;
pub mod synthetic;

pub use image_sequence::ImageSequenceProvider;
pub use synthetic::SyntheticProvider;
