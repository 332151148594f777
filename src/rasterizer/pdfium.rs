use image::DynamicImage;
use pdfium_render::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use ureq::Agent;

use super::{page_pixel_size, PdfRenderer, RendererSource};
use crate::error::{ExpenseError, Result};

/// Renders pages through a bound PDFium library
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfRenderer for PdfiumRenderer {
    fn render_pages(&self, pdf: &[u8], target_width: u32) -> Result<Vec<DynamicImage>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ExpenseError::Rasterize(format!("open failed: {e}")))?;

        let mut images = Vec::with_capacity(document.pages().len() as usize);
        for (index, page) in document.pages().iter().enumerate() {
            let (width, height) =
                page_pixel_size(page.width().value, page.height().value, target_width);

            let config = PdfRenderConfig::new()
                .set_target_size(width as i32, height as i32)
                .use_print_quality(true)
                .render_form_data(true);

            let bitmap = page.render_with_config(&config).map_err(|e| {
                ExpenseError::Rasterize(format!("page {} failed: {e}", index + 1))
            })?;
            images.push(bitmap.as_image());
        }

        Ok(images)
    }
}

/// Bind PDFium from one source
pub fn load_pdfium(source: &RendererSource) -> Result<Box<dyn PdfRenderer>> {
    let bindings = match source {
        RendererSource::LocalLibrary(dir) => {
            Pdfium::bind_to_library(dir.join(Pdfium::pdfium_platform_library_name()))
        }
        RendererSource::SystemLibrary => Pdfium::bind_to_system_library(),
        RendererSource::Remote {
            url,
            cache_dir,
            timeout,
        } => {
            let path = download_library(url, cache_dir, *timeout)?;
            Pdfium::bind_to_library(&path).inspect_err(|_| {
                log::warn!("discarding unusable download {}", path.display());
                let _ = fs::remove_file(&path);
            })
        }
    }
    .map_err(|e| ExpenseError::RendererUnavailable(format!("{source}: {e}")))?;

    Ok(Box::new(PdfiumRenderer {
        pdfium: Pdfium::new(bindings),
    }))
}

/// Cache subdirectory for one download URL
fn cache_key(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Fetch the library into the cache unless this URL was downloaded before
fn download_library(url: &str, cache_dir: &Path, timeout: Duration) -> Result<PathBuf> {
    let dir = cache_dir.join(cache_key(url));
    let target = dir.join(Pdfium::pdfium_platform_library_name());
    if target.exists() {
        return Ok(target);
    }
    fs::create_dir_all(&dir)?;

    let download_err = |reason: String| ExpenseError::Download {
        url: url.to_string(),
        reason,
    };

    let agent: Agent = Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();

    let mut response = agent
        .get(url)
        .call()
        .map_err(|e| download_err(e.to_string()))?;

    let partial = target.with_extension("part");
    let mut file = File::create(&partial)?;
    if let Err(e) = std::io::copy(&mut response.body_mut().as_reader(), &mut file) {
        let _ = fs::remove_file(&partial);
        return Err(download_err(e.to_string()));
    }
    fs::rename(&partial, &target)?;

    log::info!("downloaded PDF renderer from {url} to {}", target.display());
    Ok(target)
}

