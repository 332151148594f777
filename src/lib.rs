pub mod attachment;
pub mod config;
pub mod error;
pub mod export;
pub mod rasterizer;
pub mod totals;
pub mod units;

pub use attachment::{Attachment, AttachmentKind, ImageSource, PageImage};
pub use config::{Config, FormData};
pub use error::{ExpenseError, Result};
pub use export::{ExportResult, ExportSession, ExportState, Exporter};
pub use rasterizer::{PdfRenderer, RendererProvider, RendererSource};
pub use totals::Totals;
