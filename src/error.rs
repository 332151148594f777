use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpenseError {
    #[error("Config directory not found at {0}. Run 'reisekosten init' to create it.")]
    ConfigNotFound(PathBuf),

    #[error("Config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write {path}: {reason}")]
    ConfigWrite { path: PathBuf, reason: String },

    #[error("Config directory already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Unknown form field '{0}'. Run 'reisekosten set --help' for the list of fields.")]
    UnknownField(String),

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Required fields missing: {0}")]
    MissingRequired(String),

    #[error("Expense with id {0} not found")]
    ExpenseNotFound(u64),

    #[error("Invalid attachment index {index} (only {count} attachment(s))")]
    InvalidAttachmentIndex { index: usize, count: usize },

    #[error("Typst not found. Install it from https://typst.app/ or run: cargo install typst-cli")]
    TypstNotFound,

    #[error("Failed to capture form snapshot: {0}")]
    Snapshot(String),

    #[error("No PDF renderer could be loaded: {0}")]
    RendererUnavailable(String),

    #[error("PDF rendering failed: {0}")]
    Rasterize(String),

    #[error("Failed to render '{name}': {reason}")]
    PdfRender { name: String, reason: String },

    #[error("Failed to process image '{name}': {source}")]
    ImageProcessing {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to generate PDF: {0}")]
    PdfGeneration(String),

    /// Export status already worded for the user
    #[error("{0}")]
    Export(String),

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExpenseError>;
