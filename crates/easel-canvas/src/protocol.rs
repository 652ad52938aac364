//! Events sent to connected canvas clients.

use serde::{Deserialize, Serialize};

use crate::element::{CanvasElement, CanvasFile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasEvent {
    /// A generated image was merged into the canvas.
    ImageGenerated {
        canvas_id: String,
        element: CanvasElement,
        file: CanvasFile,
    },
}

impl CanvasEvent {
    pub fn canvas_id(&self) -> &str {
        match self {
            CanvasEvent::ImageGenerated { canvas_id, .. } => canvas_id,
        }
    }
}
