use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub rasterizer: RasterizerSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExportSettings {
    /// Maximum pixel width of attachment images and rendered PDF pages
    pub target_width: u32,
    /// JPEG quality for attachments, 0.0..=1.0
    pub attachment_quality: f32,
    /// JPEG quality for the form snapshot on the cover page
    pub snapshot_quality: f32,
    pub snapshot_ppi: u32,
    /// Logo drawn on the cover page; relative to the config directory
    pub logo: Option<String>,
    pub output_dir: String,
    pub author: Option<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            target_width: 1360,
            attachment_quality: 0.72,
            snapshot_quality: 0.78,
            snapshot_ppi: 144,
            logo: Some("logo.png".to_string()),
            output_dir: "output".to_string(),
            author: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RasterizerSettings {
    /// Directory holding a bundled PDFium library; tried first
    pub local_library: Option<String>,
    pub use_system_library: bool,
    /// Download URLs of a PDFium shared library, tried in order
    pub remote_sources: Vec<String>,
    pub cache_dir: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RasterizerSettings {
    fn default() -> Self {
        Self {
            local_library: Some("pdfium".to_string()),
            use_system_library: true,
            remote_sources: Vec::new(),
            cache_dir: None,
            timeout_secs: 30,
        }
    }
}
