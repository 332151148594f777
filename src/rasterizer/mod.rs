//! Rendering of PDF receipts into page images.
//!
//! The actual renderer is acquired lazily from an ordered list of sources the
//! first time a PDF needs rendering; the first source that loads wins and is
//! kept for the lifetime of the [`RendererProvider`].

mod pdfium;

pub use pdfium::{load_pdfium, PdfiumRenderer};

use image::DynamicImage;
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::attachment::{encode_jpeg, PageImage};
use crate::config::{resolve_path, RasterizerSettings};
use crate::error::{ExpenseError, Result};

/// A loaded PDF rendering capability
pub trait PdfRenderer {
    /// Render every page of `pdf`, in page order, `target_width` pixels wide
    fn render_pages(&self, pdf: &[u8], target_width: u32) -> Result<Vec<DynamicImage>>;
}

/// Where a renderer can be loaded from
#[derive(Debug, Clone, PartialEq)]
pub enum RendererSource {
    /// Directory containing a bundled library
    LocalLibrary(PathBuf),
    SystemLibrary,
    /// Library downloaded once into `cache_dir`
    Remote {
        url: String,
        cache_dir: PathBuf,
        timeout: Duration,
    },
}

impl fmt::Display for RendererSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererSource::LocalLibrary(dir) => write!(f, "local library in {}", dir.display()),
            RendererSource::SystemLibrary => f.write_str("system library"),
            RendererSource::Remote { url, .. } => write!(f, "remote library {url}"),
        }
    }
}

/// Ordered sources from the `[rasterizer]` settings: local, system, then remote URLs
pub fn sources_from_settings(settings: &RasterizerSettings, config_dir: &Path) -> Vec<RendererSource> {
    let mut sources = Vec::new();

    if let Some(dir) = &settings.local_library {
        sources.push(RendererSource::LocalLibrary(resolve_path(dir, config_dir)));
    }
    if settings.use_system_library {
        sources.push(RendererSource::SystemLibrary);
    }

    let cache_dir = settings
        .cache_dir
        .as_deref()
        .map(|dir| resolve_path(dir, config_dir))
        .unwrap_or_else(|| config_dir.join("cache"));
    for url in &settings.remote_sources {
        sources.push(RendererSource::Remote {
            url: url.clone(),
            cache_dir: cache_dir.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        });
    }

    sources
}

pub type RendererLoader = Box<dyn Fn(&RendererSource) -> Result<Box<dyn PdfRenderer>>>;

/// Lazily acquires a renderer, trying each source in order
pub struct RendererProvider {
    sources: Vec<RendererSource>,
    loader: RendererLoader,
    renderer: OnceCell<Box<dyn PdfRenderer>>,
}

impl RendererProvider {
    pub fn new(sources: Vec<RendererSource>, loader: RendererLoader) -> Self {
        Self {
            sources,
            loader,
            renderer: OnceCell::new(),
        }
    }

    /// PDFium from the configured sources
    pub fn pdfium(settings: &RasterizerSettings, config_dir: &Path) -> Self {
        Self::new(
            sources_from_settings(settings, config_dir),
            Box::new(load_pdfium),
        )
    }

    /// A provider whose renderer is already loaded
    pub fn with_renderer(renderer: Box<dyn PdfRenderer>) -> Self {
        let provider = Self::new(
            Vec::new(),
            Box::new(|_: &RendererSource| -> Result<Box<dyn PdfRenderer>> {
                Err(ExpenseError::RendererUnavailable("no sources configured".to_string()))
            }),
        );
        let _ = provider.renderer.set(renderer);
        provider
    }

    pub fn is_loaded(&self) -> bool {
        self.renderer.get().is_some()
    }

    /// The renderer, loading it on first use. Failed attempts are retried on the next call.
    pub fn acquire(&self) -> Result<&dyn PdfRenderer> {
        if let Some(renderer) = self.renderer.get() {
            return Ok(renderer.as_ref());
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            match (self.loader)(source) {
                Ok(renderer) => {
                    log::debug!("PDF renderer loaded from {source}");
                    return Ok(self.renderer.get_or_init(|| renderer).as_ref());
                }
                Err(e) => {
                    log::debug!("PDF renderer not available from {source}: {e}");
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            failures.push("no sources configured".to_string());
        }
        Err(ExpenseError::RendererUnavailable(failures.join("; ")))
    }
}

/// Pixel size for a page of `width_pt` x `height_pt` rendered `target_width` wide
pub fn page_pixel_size(width_pt: f32, height_pt: f32, target_width: u32) -> (u32, u32) {
    if width_pt <= 0.0 || height_pt <= 0.0 {
        return (target_width, target_width);
    }
    let aspect = f64::from(height_pt) / f64::from(width_pt);
    let height = (f64::from(target_width) * aspect).round().max(1.0) as u32;
    (target_width, height)
}

/// Render a PDF attachment into JPEG pages named `"<name> (Seite n)"`
pub fn rasterize_pdf(
    renderer: &dyn PdfRenderer,
    name: &str,
    pdf: &[u8],
    target_width: u32,
    quality: f32,
) -> Result<Vec<PageImage>> {
    let fail = |reason: String| ExpenseError::PdfRender {
        name: name.to_string(),
        reason,
    };

    let pages = renderer
        .render_pages(pdf, target_width)
        .map_err(|e| fail(e.to_string()))?;

    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let jpeg = encode_jpeg(page, quality).map_err(|e| fail(e.to_string()))?;
            Ok(PageImage {
                name: format!("{} (Seite {})", name, i + 1),
                jpeg,
                width: page.width(),
                height: page.height(),
            })
        })
        .collect()
}
