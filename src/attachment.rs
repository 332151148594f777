//! Receipt uploads: classification by media type and preparation of page images.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, Rgb, RgbImage};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AttachmentEntry;
use crate::error::{ExpenseError, Result};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Where the encoded bytes of an image attachment come from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    /// Read at export time; a file that has gone missing only skips this attachment
    File(PathBuf),
}

impl ImageSource {
    pub fn bytes(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            ImageSource::Bytes(data) => Ok(Cow::Borrowed(data)),
            ImageSource::File(path) => fs::read(path).map(Cow::Owned),
        }
    }
}

/// An accepted upload, in upload order
#[derive(Debug, Clone)]
pub enum Attachment {
    /// Encoded image as uploaded; decoded and downscaled at export time
    Image { name: String, source: ImageSource },
    /// Reference to an undecoded PDF; pages are rendered at export time
    PdfDocument { name: String, path: PathBuf },
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Attachment::Image { name, .. } | Attachment::PdfDocument { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Pdf,
}

/// One page of the attachment section: a JPEG ready to embed
#[derive(Debug, Clone)]
pub struct PageImage {
    pub name: String,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Map a declared media type to an attachment kind; `None` for unsupported types
pub fn classify(media_type: &str) -> Option<AttachmentKind> {
    let media_type = media_type.trim().to_ascii_lowercase();
    if media_type.starts_with("image/") {
        Some(AttachmentKind::Image)
    } else if media_type == PDF_MEDIA_TYPE {
        Some(AttachmentKind::Pdf)
    } else {
        None
    }
}

/// Media type inferred from the file extension
pub fn media_type_for_path(path: &Path) -> Option<String> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return Some(PDF_MEDIA_TYPE.to_string());
    }
    ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Build upload entries for the given files, dropping unsupported types.
///
/// `declared` overrides the media type of every file. Order is preserved.
pub fn accept_uploads(paths: &[PathBuf], declared: Option<&str>) -> Vec<AttachmentEntry> {
    paths
        .iter()
        .filter_map(|path| {
            let media_type = match declared {
                Some(m) => m.to_string(),
                None => media_type_for_path(path).unwrap_or_default(),
            };
            if classify(&media_type).is_none() {
                log::debug!("skipping {} ({:?})", path.display(), media_type);
                return None;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Some(AttachmentEntry {
                name,
                path: path.clone(),
                media_type,
            })
        })
        .collect()
}

/// Turn stored upload entries into attachments.
///
/// Nothing is read here: images and PDFs keep their path until export. Entries
/// with an unsupported media type are skipped.
pub fn normalize_uploads(entries: &[AttachmentEntry]) -> Vec<Attachment> {
    let mut attachments = Vec::with_capacity(entries.len());
    for entry in entries {
        match classify(&entry.media_type) {
            Some(AttachmentKind::Image) => attachments.push(Attachment::Image {
                name: entry.name.clone(),
                source: ImageSource::File(entry.path.clone()),
            }),
            Some(AttachmentKind::Pdf) => attachments.push(Attachment::PdfDocument {
                name: entry.name.clone(),
                path: entry.path.clone(),
            }),
            None => log::debug!("skipping {} ({})", entry.name, entry.media_type),
        }
    }
    attachments
}

/// Read an image attachment and turn it into a page image
pub fn prepare_attachment_image(
    name: &str,
    source: &ImageSource,
    target_width: u32,
    quality: f32,
) -> Result<PageImage> {
    let data = source
        .bytes()
        .map_err(|e| ExpenseError::ImageProcessing {
            name: name.to_string(),
            source: ImageError::IoError(e),
        })?;
    prepare_image(name, &data, target_width, quality)
}

/// Decode an uploaded image, downscale it to `target_width` and re-encode as JPEG
pub fn prepare_image(name: &str, data: &[u8], target_width: u32, quality: f32) -> Result<PageImage> {
    let wrap = |source| ExpenseError::ImageProcessing {
        name: name.to_string(),
        source,
    };

    let decoded = image::load_from_memory(data).map_err(wrap)?;
    let scaled = downscale(&decoded, target_width);
    let jpeg = encode_jpeg(&scaled, quality).map_err(wrap)?;

    Ok(PageImage {
        name: name.to_string(),
        jpeg,
        width: scaled.width(),
        height: scaled.height(),
    })
}

/// Shrink to at most `target_width` pixels wide, keeping the aspect ratio. Never upscales.
pub fn downscale(img: &DynamicImage, target_width: u32) -> DynamicImage {
    if target_width == 0 || img.width() <= target_width {
        return img.clone();
    }
    let scale = f64::from(target_width) / f64::from(img.width());
    let height = ((f64::from(img.height()) * scale).round() as u32).max(1);
    img.resize_exact(target_width, height, FilterType::CatmullRom)
}

/// Encode as baseline JPEG; `quality` is 0.0..=1.0
pub fn encode_jpeg(img: &DynamicImage, quality: f32) -> image::ImageResult<Vec<u8>> {
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let rgb = flatten_onto_white(img);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out)
}

/// JPEG has no alpha channel; blend transparent pixels onto white
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}
