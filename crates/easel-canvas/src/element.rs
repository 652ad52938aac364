//! Excalidraw element and file records.

use serde::{Deserialize, Serialize};

/// An image element as Excalidraw stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub file_id: String,
    pub stroke_color: String,
    pub background_color: String,
    pub fill_style: String,
    pub stroke_style: String,
    pub stroke_width: u32,
    pub roughness: u32,
    pub opacity: u32,
    pub group_ids: Vec<String>,
    pub bound_elements: Option<serde_json::Value>,
    pub roundness: Option<serde_json::Value>,
    pub frame_id: Option<String>,
    pub seed: u32,
    pub version: u32,
    pub version_nonce: u32,
    pub is_deleted: bool,
    pub index: Option<String>,
    pub updated: i64,
    pub link: Option<String>,
    pub locked: bool,
    pub status: String,
    pub scale: [f64; 2],
    pub crop: Option<serde_json::Value>,
}

impl CanvasElement {
    /// A fresh image element. The element id and file id are both `file_id`.
    pub fn image(file_id: &str, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            kind: "image".into(),
            id: file_id.into(),
            x,
            y,
            width,
            height,
            angle: 0.0,
            file_id: file_id.into(),
            stroke_color: "#000000".into(),
            background_color: "transparent".into(),
            fill_style: "solid".into(),
            stroke_style: "solid".into(),
            stroke_width: 1,
            roughness: 0,
            opacity: 100,
            group_ids: Vec::new(),
            bound_elements: None,
            roundness: None,
            frame_id: None,
            seed: rand::random_range(0..1_000_000),
            version: 1,
            version_nonce: rand::random_range(0..1_000_000),
            is_deleted: false,
            index: None,
            updated: 0,
            link: None,
            locked: false,
            status: "saved".into(),
            scale: [1.0, 1.0],
            crop: None,
        }
    }
}

/// Binary file reference attached to an image element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasFile {
    pub id: String,
    #[serde(rename = "dataURL")]
    pub data_url: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Epoch milliseconds.
    pub created: i64,
}

impl CanvasFile {
    /// File served from the content store at `/api/file/<file_id>`.
    pub fn served(file_id: &str, mime_type: &str) -> Self {
        Self {
            id: file_id.into(),
            data_url: file_url(file_id),
            mime_type: mime_type.into(),
            created: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Client-facing URL of a stored file.
pub fn file_url(file_id: &str) -> String {
    format!("/api/file/{file_id}")
}
