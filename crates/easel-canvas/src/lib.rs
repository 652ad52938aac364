//! Canvas documents: placing generated images and announcing them.
//!
//! A canvas is an Excalidraw-style JSON document owned by the persistence
//! gateway. This crate computes where a new image element goes, merges it into
//! the stored document, and produces the `image_generated` event that connected
//! canvas clients receive.

pub mod element;
pub mod protocol;
pub mod synthesizer;

pub use element::{CanvasElement, CanvasFile};
pub use protocol::CanvasEvent;
pub use synthesizer::{CanvasSynthesizer, merge_image, next_position, synthesize_image_element};
