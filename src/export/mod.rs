//! Assembly of the exported expense report.
//!
//! One export runs through `Capturing → ComposingCover → ProcessingAttachments
//! → Paginating → Finalized`, or ends in `Failed`. Per-attachment problems only
//! add warnings; anything else aborts the export without exposing a document.

mod layout;
mod snapshot;
mod writer;

pub use layout::{
    attachment_layout, cover_layout, fit_within, AttachmentLayout, CoverLayout, Orientation,
    PageSize, Rect, A4,
};
pub use snapshot::{ScratchArea, SnapshotRenderer, TypstSnapshot};
pub use writer::{win_ansi, DocumentInfo, PageContent, PdfWriter};

use chrono::Local;
use image::DynamicImage;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::attachment::{encode_jpeg, prepare_attachment_image, Attachment, PageImage};
use crate::config::{Basis, ExportSettings, FormData};
use crate::error::{ExpenseError, Result};
use crate::rasterizer::{rasterize_pdf, RendererProvider};
use crate::totals::Totals;
use crate::units::format_currency;

const METADATA_GRAY: f64 = 0.45;
const CAPTION_GRAY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Capturing,
    ComposingCover,
    ProcessingAttachments,
    Paginating,
    Finalized,
    Failed,
}

/// The finished document of one export
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub document: Vec<u8>,
    pub filename: String,
    pub warnings: Vec<String>,
    pub total: f64,
    pub page_count: usize,
}

impl ExportResult {
    /// Write the document into `dir` under its suggested filename
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        self.save_as(&path)?;
        Ok(path)
    }

    pub fn save_as(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.document)?;
        Ok(())
    }
}

/// `file://` URL for previewing a saved document
pub fn preview_url(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

/// `Reisekosten_<name>_KW<week>.pdf`, with `/` in the week turned into `-`
pub fn suggested_filename(basis: &Basis) -> String {
    let name = if basis.name.trim().is_empty() {
        "Mitarbeiter".to_string()
    } else {
        basis.name.trim().replace(['/', '\\'], "_")
    };
    let week = if basis.calendar_week.trim().is_empty() {
        "XX".to_string()
    } else {
        basis.calendar_week.trim().replace('/', "-")
    };
    format!("Reisekosten_{name}_KW{week}.pdf")
}

/// Clears the busy flag when the export ends, however it ends
struct BusyGuard<'a>(&'a Cell<bool>);

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct Exporter {
    settings: ExportSettings,
    logo: Option<PathBuf>,
    snapshot: Box<dyn SnapshotRenderer>,
    renderer: RendererProvider,
    state: Cell<ExportState>,
    busy: Cell<bool>,
}

impl Exporter {
    pub fn new(
        settings: ExportSettings,
        snapshot: Box<dyn SnapshotRenderer>,
        renderer: RendererProvider,
    ) -> Self {
        Self {
            settings,
            logo: None,
            snapshot,
            renderer,
            state: Cell::new(ExportState::Idle),
            busy: Cell::new(false),
        }
    }

    /// Logo for the cover page; a missing or unreadable file is simply left out
    pub fn with_logo(mut self, logo: Option<PathBuf>) -> Self {
        self.logo = logo;
        self
    }

    pub fn state(&self) -> ExportState {
        self.state.get()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    fn transition(&self, state: ExportState) {
        log::debug!("export: {:?} -> {:?}", self.state.get(), state);
        self.state.set(state);
    }

    /// Run one export. Returns `Ok(None)` without doing anything while another export is running.
    pub fn export(
        &self,
        form: &FormData,
        attachments: &[Attachment],
    ) -> Result<Option<ExportResult>> {
        let Some(_busy) = BusyGuard::enter(&self.busy) else {
            log::debug!("export already in progress, ignoring trigger");
            return Ok(None);
        };

        match self.run(form, attachments) {
            Ok(result) => {
                self.transition(ExportState::Finalized);
                log::info!(
                    "exported {} ({} pages, {} warnings)",
                    result.filename,
                    result.page_count,
                    result.warnings.len()
                );
                Ok(Some(result))
            }
            Err(e) => {
                self.transition(ExportState::Failed);
                Err(e)
            }
        }
    }

    fn run(&self, form: &FormData, attachments: &[Attachment]) -> Result<ExportResult> {
        let totals = Totals::compute(form);

        self.transition(ExportState::Capturing);
        let snapshot = self.snapshot.capture(form, &totals)?;

        self.transition(ExportState::ComposingCover);
        let mut writer = PdfWriter::new();
        self.compose_cover(&mut writer, form, &totals, &snapshot)?;

        self.transition(ExportState::ProcessingAttachments);
        let mut warnings = Vec::new();
        let pages = self.process_attachments(attachments, &mut warnings);

        self.transition(ExportState::Paginating);
        for page in &pages {
            paginate(&mut writer, page)?;
        }

        let page_count = writer.page_count();
        let document = writer.finish()?;

        Ok(ExportResult {
            document,
            filename: suggested_filename(&form.basis),
            warnings,
            total: totals.grand,
            page_count,
        })
    }

    fn load_logo(&self) -> Option<DynamicImage> {
        let path = self.logo.as_ref()?;
        match image::open(path) {
            Ok(logo) => Some(logo),
            Err(e) => {
                log::debug!("no logo at {}: {e}", path.display());
                None
            }
        }
    }

    fn compose_cover(
        &self,
        writer: &mut PdfWriter,
        form: &FormData,
        totals: &Totals,
        snapshot: &DynamicImage,
    ) -> Result<()> {
        let logo = self.load_logo();
        let today = Local::now().format("%d.%m.%Y").to_string();
        let metadata = [
            format!("Betrag: {}", format_currency(totals.grand)),
            format!("Datum: {today}"),
        ];

        let layout = cover_layout(
            A4,
            snapshot.width(),
            snapshot.height(),
            logo.is_some(),
            metadata.len(),
        );

        let jpeg = encode_jpeg(snapshot, self.settings.snapshot_quality).map_err(|e| {
            ExpenseError::PdfGeneration(format!("form snapshot could not be encoded: {e}"))
        })?;
        let snapshot_id = writer.embed_jpeg(&jpeg, snapshot.width(), snapshot.height());

        let mut page = PageContent::new(layout.page);
        page.draw_image(snapshot_id, layout.snapshot);
        if let (Some(logo), Some(rect)) = (&logo, layout.logo) {
            let logo_id = writer.embed_image(logo);
            page.draw_image(logo_id, rect);
        }
        for (line, baseline) in metadata.iter().zip(&layout.metadata_baselines) {
            page.draw_text(
                line,
                layout::COVER_MARGIN,
                *baseline,
                layout::METADATA_FONT_SIZE,
                METADATA_GRAY,
            );
        }
        writer.add_page(page)?;

        writer.set_info(&self.document_info(form, totals));
        Ok(())
    }

    fn document_info(&self, form: &FormData, totals: &Totals) -> DocumentInfo {
        let basis = &form.basis;
        let mut keywords = vec![
            "Reisekostenabrechnung".to_string(),
            format!("Gesamt {}", format_currency(totals.grand)),
        ];
        if !basis.calendar_week.is_empty() {
            keywords.push(format!("KW {}", basis.calendar_week));
        }

        DocumentInfo {
            title: format!("Reisekostenabrechnung {}", basis.name).trim().to_string(),
            author: self
                .settings
                .author
                .clone()
                .unwrap_or_else(|| basis.name.clone()),
            subject: basis.purpose.clone(),
            keywords,
        }
    }

    /// All images in upload order, then every PDF expanded to its pages
    fn process_attachments(
        &self,
        attachments: &[Attachment],
        warnings: &mut Vec<String>,
    ) -> Vec<PageImage> {
        let target_width = self.settings.target_width;
        let quality = self.settings.attachment_quality;
        let mut pages = Vec::new();

        for attachment in attachments {
            if let Attachment::Image { name, source } = attachment {
                match prepare_attachment_image(name, source, target_width, quality) {
                    Ok(page) => pages.push(page),
                    Err(e) => {
                        log::warn!("skipping image attachment {name}: {e}");
                        warnings.push(format!("Bildanhang übersprungen: {e}"));
                    }
                }
            }
        }

        for attachment in attachments {
            if let Attachment::PdfDocument { name, path } = attachment {
                match self.render_pdf(name, path) {
                    Ok(rendered) => pages.extend(rendered),
                    Err(e) => {
                        log::warn!("skipping PDF attachment {name}: {e}");
                        warnings.push(format!("PDF-Anhang übersprungen: {e}"));
                    }
                }
            }
        }

        pages
    }

    fn render_pdf(&self, name: &str, path: &Path) -> Result<Vec<PageImage>> {
        let renderer = self.renderer.acquire().map_err(|e| ExpenseError::PdfRender {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let bytes = fs::read(path).map_err(|e| ExpenseError::PdfRender {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        rasterize_pdf(
            renderer,
            name,
            &bytes,
            self.settings.target_width,
            self.settings.attachment_quality,
        )
    }
}

/// One attachment page: the image fit to the page plus its name as caption
fn paginate(writer: &mut PdfWriter, image: &PageImage) -> Result<()> {
    let layout = attachment_layout(image.width, image.height);
    let image_id = writer.embed_jpeg(&image.jpeg, image.width, image.height);

    let caption = if image.name.is_empty() {
        "Anhang"
    } else {
        image.name.as_str()
    };

    let mut page = PageContent::new(layout.page);
    page.draw_image(image_id, layout.image);
    page.draw_text(
        caption,
        layout.caption_x,
        layout.caption_baseline,
        layout::CAPTION_FONT_SIZE,
        CAPTION_GRAY,
    );
    writer.add_page(page)
}

/// Message shown after an export; an error always replaces a warning
#[derive(Debug, Clone, PartialEq)]
pub enum StatusMessage {
    Warning(String),
    Error(String),
}

/// Export outcome as presented to the user: the latest document and one status message
pub struct ExportSession {
    exporter: Exporter,
    last: Option<ExportResult>,
    message: Option<StatusMessage>,
}

impl ExportSession {
    pub fn new(exporter: Exporter) -> Self {
        Self {
            exporter,
            last: None,
            message: None,
        }
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// Document of the last successful export, until the next export fails or succeeds
    pub fn last(&self) -> Option<&ExportResult> {
        self.last.as_ref()
    }

    pub fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }

    pub fn export(&mut self, form: &FormData, attachments: &[Attachment]) -> Option<&ExportResult> {
        match self.exporter.export(form, attachments) {
            Ok(Some(result)) => {
                self.message = (!result.warnings.is_empty()).then(|| {
                    StatusMessage::Warning(format!(
                        "Hinweis: Mindestens ein Anhang konnte nicht verarbeitet werden. \
                         Die übrigen Seiten wurden dennoch exportiert. ({})",
                        result.warnings.join("; ")
                    ))
                });
                self.last = Some(result);
            }
            Ok(None) => {}
            Err(e) => {
                self.last = None;
                self.message = Some(StatusMessage::Error(format!(
                    "PDF-Erzeugung fehlgeschlagen: {e}"
                )));
            }
        }
        self.last.as_ref()
    }
}
