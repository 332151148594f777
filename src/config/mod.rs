mod form;
mod settings;

pub use form::{
    AttachmentEntry, Basis, FormData, Lodging, MiscExpense, PerDiem, Trip, FIELD_KEYS,
};
pub use settings::{Config, ExportSettings, RasterizerSettings};

use crate::error::{ExpenseError, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the config directory path (XDG config dir or ~/.reisekosten/)
pub fn config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "reisekosten") {
        return Ok(proj_dirs.config_dir().to_path_buf());
    }

    let home = dirs_home().ok_or_else(|| {
        ExpenseError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        ))
    })?;

    Ok(home.join(".reisekosten"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Expand ~ in paths
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand ~ and resolve relative paths against the config directory
pub fn resolve_path(path: &str, config_dir: &Path) -> PathBuf {
    let expanded = expand_path(path);
    if expanded.is_absolute() {
        expanded
    } else {
        config_dir.join(expanded)
    }
}

/// Load config.toml; a missing file yields the defaults
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let path = config_dir.join("config.toml");
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(&path)?;
    toml::from_str(&content).map_err(|e| ExpenseError::ConfigParse { path, source: e })
}

/// Load form.toml and recompute its derived fields
pub fn load_form(config_dir: &Path) -> Result<FormData> {
    let path = config_dir.join("form.toml");
    if !path.exists() {
        return Err(ExpenseError::ConfigFileNotFound(path));
    }
    let content = fs::read_to_string(&path)?;
    let mut form: FormData =
        toml::from_str(&content).map_err(|e| ExpenseError::ConfigParse { path, source: e })?;
    form.recompute();
    Ok(form)
}

/// Save form.toml
pub fn save_form(config_dir: &Path, form: &FormData) -> Result<()> {
    let path = config_dir.join("form.toml");
    let content = toml::to_string_pretty(form).map_err(|e| ExpenseError::ConfigWrite {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    fs::write(path, content)?;
    Ok(())
}

/// Template content for config.toml
pub const CONFIG_TEMPLATE: &str = r#"[export]
target_width = 1360          # max pixel width of attachment pages
attachment_quality = 0.72    # JPEG quality of attachments (0.0 - 1.0)
snapshot_quality = 0.78      # JPEG quality of the form on the cover page
snapshot_ppi = 144
logo = "logo.png"            # optional, relative to this directory
output_dir = "output"
# author = "Tritos Consulting GmbH"

[rasterizer]
# Rendering PDF receipts needs PDFium. Sources are tried in this order:
local_library = "pdfium"     # directory containing libpdfium
use_system_library = true
# remote_sources = ["https://example.com/pdfium/libpdfium.so"]
timeout_secs = 30
"#;

/// Template content for form.toml
pub const FORM_TEMPLATE: &str = r#"# Numbers may be written as TOML numbers or as text with a decimal comma ("12,50").

[basis]
name = ""
purpose = ""
start_date = ""       # YYYY-MM-DD
end_date = ""
calendar_week = ""    # derived from start_date while auto_week = true
auto_week = true
company = ""

[trip]
plate = ""
odometer_start = ""
odometer_end = ""
distance_km = ""      # derived from the odometer readings when both are set
public_transport = ""
rail = ""
taxi = ""

[per_diem]
days_over_8h = 0
days_24h = 0
rate_over_8h = 14
rate_24h = 28
breakfast_count = 0
breakfast_deduction = 5.6

[lodging]
actual_cost = ""
flat_rate = ""
"#;
