//! Placement of generated images on a canvas.
//!
//! New images go to the right of the most recently added image element with a
//! fixed gap, top-aligned with it. The first image lands at the origin.
//!
//! Merging is read-modify-write against the gateway with no version check:
//! two images finishing at once for the same canvas race, and the later save
//! wins.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use easel_core::store::PersistenceGateway;
use easel_core::{EaselError, Result};

use crate::element::{CanvasElement, CanvasFile};
use crate::protocol::CanvasEvent;

/// Horizontal gap between consecutive images.
pub const IMAGE_GAP: f64 = 20.0;

fn number(element: &Value, key: &str) -> f64 {
    element.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn elements(document: &Value) -> &[Value] {
    document
        .get("elements")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Top-left corner for the next image given the existing elements.
pub fn next_position(elements: &[Value]) -> (f64, f64) {
    elements
        .iter()
        .rev()
        .find(|e| e.get("type").and_then(Value::as_str) == Some("image"))
        .map(|last| {
            (
                number(last, "x") + number(last, "width") + IMAGE_GAP,
                number(last, "y"),
            )
        })
        .unwrap_or((0.0, 0.0))
}

/// Build the element for a new image without touching the document.
pub fn synthesize_image_element(
    document: &Value,
    file_id: &str,
    width: u32,
    height: u32,
) -> CanvasElement {
    let (x, y) = next_position(elements(document));
    CanvasElement::image(file_id, x, y, f64::from(width), f64::from(height))
}

/// Append `element` to the document's `elements` and register `file` under
/// `files`, creating either collection when missing.
pub fn merge_image(document: &mut Value, element: &CanvasElement, file: &CanvasFile) -> Result<()> {
    let Some(doc) = document.as_object_mut() else {
        return Err(EaselError::Storage("canvas document is not an object".into()));
    };

    let elements = doc.entry("elements").or_insert_with(|| json!([]));
    match elements.as_array_mut() {
        Some(list) => list.push(serde_json::to_value(element)?),
        None => return Err(EaselError::Storage("canvas elements is not an array".into())),
    }

    let files = doc.entry("files").or_insert_with(|| json!({}));
    match files.as_object_mut() {
        Some(map) => {
            map.insert(file.id.clone(), serde_json::to_value(file)?);
        }
        None => return Err(EaselError::Storage("canvas files is not an object".into())),
    }
    Ok(())
}

/// Places generated images into stored canvases.
#[derive(Clone)]
pub struct CanvasSynthesizer {
    gateway: Arc<dyn PersistenceGateway>,
}

impl CanvasSynthesizer {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Add an image to a canvas and return the event announcing it, or `None`
    /// when the canvas does not exist.
    pub async fn place_image(
        &self,
        canvas_id: &str,
        file_id: &str,
        mime_type: &str,
        width: u32,
        height: u32,
    ) -> Result<Option<CanvasEvent>> {
        let Some(mut document) = self.gateway.get_canvas_data(canvas_id).await? else {
            warn!(canvas_id, "Canvas not found, skipping image placement");
            return Ok(None);
        };

        let element = synthesize_image_element(&document, file_id, width, height);
        let file = CanvasFile::served(file_id, mime_type);
        merge_image(&mut document, &element, &file)?;
        self.gateway
            .save_canvas_data(canvas_id, &serde_json::to_string(&document)?)
            .await?;

        debug!(canvas_id, file_id, x = element.x, y = element.y, "Image placed on canvas");
        Ok(Some(CanvasEvent::ImageGenerated {
            canvas_id: canvas_id.to_string(),
            element,
            file,
        }))
    }
}
