use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use reisekosten::attachment::{accept_uploads, normalize_uploads};
use reisekosten::config::{
    config_dir, load_config, load_form, resolve_path, save_form, CONFIG_TEMPLATE, FIELD_KEYS,
    FORM_TEMPLATE,
};
use reisekosten::error::{ExpenseError, Result};
use reisekosten::export::{preview_url, ExportSession, Exporter, StatusMessage, TypstSnapshot};
use reisekosten::rasterizer::RendererProvider;
use reisekosten::totals::Totals;
use reisekosten::units::{format_currency, iso_calendar_week, NumberInput};

#[derive(Parser)]
#[command(name = "reisekosten")]
#[command(version, about = "Travel expense reports with receipts as a single PDF", long_about = None)]
struct Cli {
    /// Path to config directory (default: ~/.reisekosten or XDG config)
    #[arg(short = 'C', long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory with template files
    Init,

    /// Show the current form and what is still missing
    Status,

    /// Show the computed totals
    Totals,

    /// Set a form field, e.g. `set trip.rail 49,90`
    #[command(after_help = field_help())]
    Set {
        /// Field key in the form `section.field`
        field: String,

        /// New value; numbers may use a decimal comma
        value: String,
    },

    /// Manage miscellaneous expenses
    Misc {
        #[command(subcommand)]
        command: MiscCommands,
    },

    /// Attach receipt files (images or PDFs)
    Attach {
        /// Files to attach, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Media type for all files (default: guessed from the extension)
        #[arg(short = 't', long = "type", value_name = "MEDIA_TYPE")]
        media_type: Option<String>,
    },

    /// Remove an attachment by its position from 'attachments'
    Detach {
        /// 1-based position
        index: usize,
    },

    /// List attachments
    Attachments,

    /// Print the ISO calendar week of a date (YYYY-MM-DD)
    Week {
        date: String,
    },

    /// Export the report with all attachments as one PDF
    Export {
        /// Custom output file path (default: output_dir/<suggested name>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Open the exported PDF with the system default viewer
        #[arg(long)]
        open: bool,
    },
}

#[derive(Subcommand)]
enum MiscCommands {
    /// Add an expense
    Add {
        label: String,
        amount: String,
    },
    /// Remove an expense by id
    Remove {
        id: u64,
    },
    /// List expenses
    List,
}

fn field_help() -> String {
    format!("Fields:\n  {}", FIELD_KEYS.join("\n  "))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let cfg_dir = match cli.config_dir {
        Some(p) => p,
        None => config_dir()?,
    };

    match cli.command {
        Commands::Init => cmd_init(&cfg_dir),
        Commands::Status => cmd_status(&cfg_dir),
        Commands::Totals => cmd_totals(&cfg_dir),
        Commands::Set { field, value } => cmd_set(&cfg_dir, &field, &value),
        Commands::Misc { command } => match command {
            MiscCommands::Add { label, amount } => cmd_misc_add(&cfg_dir, &label, &amount),
            MiscCommands::Remove { id } => cmd_misc_remove(&cfg_dir, id),
            MiscCommands::List => cmd_misc_list(&cfg_dir),
        },
        Commands::Attach { files, media_type } => {
            cmd_attach(&cfg_dir, &files, media_type.as_deref())
        }
        Commands::Detach { index } => cmd_detach(&cfg_dir, index),
        Commands::Attachments => cmd_attachments(&cfg_dir),
        Commands::Week { date } => cmd_week(&date),
        Commands::Export { output, open } => cmd_export(&cfg_dir, output, open),
    }
}

fn ensure_initialized(cfg_dir: &Path) -> Result<()> {
    if !cfg_dir.exists() {
        return Err(ExpenseError::ConfigNotFound(cfg_dir.to_path_buf()));
    }
    Ok(())
}

/// Initialize config directory with template files
fn cmd_init(cfg_dir: &Path) -> Result<()> {
    use std::fs;

    if cfg_dir.exists() {
        return Err(ExpenseError::AlreadyInitialized(cfg_dir.to_path_buf()));
    }

    fs::create_dir_all(cfg_dir)?;
    fs::create_dir_all(cfg_dir.join("output"))?;
    fs::write(cfg_dir.join("config.toml"), CONFIG_TEMPLATE)?;
    fs::write(cfg_dir.join("form.toml"), FORM_TEMPLATE)?;

    println!("Initialized reisekosten config at: {}", cfg_dir.display());
    println!();
    println!("Next steps:");
    println!(
        "  1. Fill in the form:        $EDITOR {}/form.toml",
        cfg_dir.display()
    );
    println!("     or field by field:      reisekosten set basis.name \"Erika Mustermann\"");
    println!("  2. Attach receipts:        reisekosten attach beleg.jpg rechnung.pdf");
    println!("  3. Export the report:      reisekosten export --open");
    println!();
    println!(
        "A logo.png in {} is placed on the cover page.",
        cfg_dir.display()
    );

    Ok(())
}

#[derive(Tabled)]
struct TotalRow {
    #[tabled(rename = "GROUP")]
    group: String,
    #[tabled(rename = "AMOUNT")]
    amount: String,
}

#[derive(Tabled)]
struct MiscRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "LABEL")]
    label: String,
    #[tabled(rename = "AMOUNT")]
    amount: String,
}

#[derive(Tabled)]
struct AttachmentRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    media_type: String,
    #[tabled(rename = "PATH")]
    path: String,
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Show the form status
fn cmd_status(cfg_dir: &Path) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let form = load_form(cfg_dir)?;
    let totals = Totals::compute(&form);
    let b = &form.basis;

    println!("Reisekostenabrechnung");
    println!("{}", "-".repeat(50));
    println!("Config directory: {}", cfg_dir.display());
    println!("Name:             {}", or_dash(&b.name));
    println!("Zweck:            {}", or_dash(&b.purpose));
    println!("Firma:            {}", or_dash(&b.company));
    println!(
        "Zeitraum:         {} - {}",
        or_dash(&b.start_date),
        or_dash(&b.end_date)
    );
    println!("Kalenderwoche:    {}", or_dash(&b.calendar_week));
    println!("Sonstige:         {}", form.misc.len());
    println!("Anhänge:          {}", form.attachments.len());
    println!("Gesamt:           {}", format_currency(totals.grand));

    let missing = form.missing_required();
    if !missing.is_empty() {
        println!();
        println!("Missing before export: {}", missing.join(", "));
    }

    Ok(())
}

/// Show the computed totals
fn cmd_totals(cfg_dir: &Path) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let form = load_form(cfg_dir)?;
    let totals = Totals::compute(&form);

    let rows = [
        ("Fahrtkosten", totals.trip),
        ("Verpflegungsmehraufwand", totals.per_diem),
        ("Übernachtungskosten", totals.lodging),
        ("Sonstige Auslagen", totals.misc),
        ("Gesamt", totals.grand),
    ]
    .into_iter()
    .map(|(group, amount)| TotalRow {
        group: group.to_string(),
        amount: format_currency(amount),
    });

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");

    Ok(())
}

/// Set a single form field
fn cmd_set(cfg_dir: &Path, field: &str, value: &str) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let mut form = load_form(cfg_dir)?;
    form.set_field(field, value)?;
    save_form(cfg_dir, &form)?;

    println!("Set {field} = {value}");
    if field == "basis.start_date" && form.basis.auto_week {
        println!("  Kalenderwoche: {}", or_dash(&form.basis.calendar_week));
    }
    Ok(())
}

fn cmd_misc_add(cfg_dir: &Path, label: &str, amount: &str) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let mut form = load_form(cfg_dir)?;
    let amount = NumberInput::from(amount);
    let shown = format_currency(amount.value());
    let id = form.add_misc(label, amount);
    save_form(cfg_dir, &form)?;

    println!("Added expense #{id}: {label} {shown}");
    Ok(())
}

fn cmd_misc_remove(cfg_dir: &Path, id: u64) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let mut form = load_form(cfg_dir)?;
    let removed = form.remove_misc(id)?;
    save_form(cfg_dir, &form)?;

    println!("Removed expense #{}: {}", removed.id, removed.label);
    Ok(())
}

fn cmd_misc_list(cfg_dir: &Path) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let form = load_form(cfg_dir)?;

    if form.misc.is_empty() {
        println!("No miscellaneous expenses.");
        return Ok(());
    }

    let rows: Vec<MiscRow> = form
        .misc
        .iter()
        .map(|m| MiscRow {
            id: m.id,
            label: m.label.clone(),
            amount: format_currency(m.amount.value()),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

/// Attach receipts; files of unsupported types are skipped
fn cmd_attach(cfg_dir: &Path, files: &[PathBuf], media_type: Option<&str>) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let mut form = load_form(cfg_dir)?;

    for file in files {
        if !file.is_file() {
            return Err(ExpenseError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", file.display()),
            )));
        }
    }

    let absolute: Vec<PathBuf> = files
        .iter()
        .map(|f| std::fs::canonicalize(f).unwrap_or_else(|_| f.clone()))
        .collect();
    let accepted = accept_uploads(&absolute, media_type);
    let skipped = files.len() - accepted.len();

    for entry in &accepted {
        println!("Attached {} ({})", entry.name, entry.media_type);
    }
    if skipped > 0 {
        println!("Skipped {skipped} file(s) of unsupported type");
    }

    form.attachments.extend(accepted);
    save_form(cfg_dir, &form)?;
    Ok(())
}

fn cmd_detach(cfg_dir: &Path, index: usize) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let mut form = load_form(cfg_dir)?;
    let removed = form.remove_attachment(index)?;
    save_form(cfg_dir, &form)?;

    println!("Removed attachment {}", removed.name);
    Ok(())
}

fn cmd_attachments(cfg_dir: &Path) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let form = load_form(cfg_dir)?;

    if form.attachments.is_empty() {
        println!("No attachments.");
        return Ok(());
    }

    let rows: Vec<AttachmentRow> = form
        .attachments
        .iter()
        .enumerate()
        .map(|(idx, entry)| AttachmentRow {
            index: idx + 1,
            name: entry.name.clone(),
            media_type: entry.media_type.clone(),
            path: entry.path.display().to_string(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

fn cmd_week(date: &str) -> Result<()> {
    let week = iso_calendar_week(date);
    if week.is_empty() {
        return Err(ExpenseError::InvalidValue {
            field: "date".to_string(),
            value: date.to_string(),
            reason: "expected YYYY-MM-DD".to_string(),
        });
    }
    println!("{week}");
    Ok(())
}

/// Export the report as one PDF
fn cmd_export(cfg_dir: &Path, output: Option<PathBuf>, open: bool) -> Result<()> {
    ensure_initialized(cfg_dir)?;
    let config = load_config(cfg_dir)?;
    let form = load_form(cfg_dir)?;

    let missing = form.missing_required();
    if !missing.is_empty() {
        return Err(ExpenseError::MissingRequired(missing.join(", ")));
    }

    let attachments = normalize_uploads(&form.attachments);
    let settings = config.export.clone();
    let logo = settings
        .logo
        .as_deref()
        .map(|logo| resolve_path(logo, cfg_dir));

    let exporter = Exporter::new(
        settings.clone(),
        Box::new(TypstSnapshot::new(settings.snapshot_ppi)),
        RendererProvider::pdfium(&config.rasterizer, cfg_dir),
    )
    .with_logo(logo);
    let mut session = ExportSession::new(exporter);
    session.export(&form, &attachments);

    if let Some(StatusMessage::Error(message)) = session.message() {
        return Err(ExpenseError::Export(message.clone()));
    }
    let Some(result) = session.last() else {
        return Ok(());
    };

    let path = match output {
        Some(path) => {
            result.save_as(&path)?;
            path
        }
        None => result.save_to_dir(&resolve_path(&settings.output_dir, cfg_dir))?,
    };

    println!("Exported {}", result.filename);
    println!("  Pages:  {}", result.page_count);
    println!("  Total:  {}", format_currency(result.total));
    println!("  Saved:  {}", path.display());
    println!("  View:   {}", preview_url(&path));

    if let Some(StatusMessage::Warning(message)) = session.message() {
        eprintln!();
        eprintln!("{message}");
    }

    if open {
        open_path(&path)?;
    }
    Ok(())
}

fn open_path(pdf_path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(pdf_path).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(pdf_path).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", ""])
            .arg(pdf_path)
            .spawn()?;
    }
    Ok(())
}
