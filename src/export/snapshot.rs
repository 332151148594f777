use image::DynamicImage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use crate::config::FormData;
use crate::error::{ExpenseError, Result};
use crate::totals::{mileage_allowance, Totals};
use crate::units::{format_currency, format_date_de, NumberInput};

/// Produces the raster image of the filled-in form shown on the cover page
pub trait SnapshotRenderer {
    fn capture(&self, form: &FormData, totals: &Totals) -> Result<DynamicImage>;
}

static SCRATCH_LOCK: Mutex<()> = Mutex::new(());

/// Exclusive use of the scratch directory within this process.
///
/// Files created through the guard are removed when it drops, whatever the
/// outcome of the capture, and the directory goes with them once empty.
pub struct ScratchArea {
    dir: PathBuf,
    files: Vec<PathBuf>,
    _lock: MutexGuard<'static, ()>,
}

impl ScratchArea {
    pub fn acquire(dir: &Path) -> Result<Self> {
        let lock = SCRATCH_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            files: Vec::new(),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a file name inside the scratch area for cleanup
    pub fn track(&mut self, file_name: &str) -> PathBuf {
        let path = self.dir.join(file_name);
        self.files.push(path.clone());
        path
    }

    pub fn write(&mut self, file_name: &str, content: &str) -> Result<PathBuf> {
        let path = self.track(file_name);
        fs::write(&path, content)?;
        Ok(path)
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        for file in &self.files {
            let _ = fs::remove_file(file);
        }
        let _ = fs::remove_dir(&self.dir);
    }
}

/// Form snapshot rendered by the Typst CLI to PNG
pub struct TypstSnapshot {
    ppi: u32,
    scratch_dir: PathBuf,
}

impl TypstSnapshot {
    pub fn new(ppi: u32) -> Self {
        let scratch = format!("reisekosten-{}", std::process::id());
        Self {
            ppi,
            scratch_dir: std::env::temp_dir().join(scratch),
        }
    }

    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

impl SnapshotRenderer for TypstSnapshot {
    fn capture(&self, form: &FormData, totals: &Totals) -> Result<DynamicImage> {
        if Command::new("typst").arg("--version").output().is_err() {
            return Err(ExpenseError::TypstNotFound);
        }

        let view = FormView::new(form, totals);
        let json_data =
            serde_json::to_string(&view).map_err(|e| ExpenseError::Snapshot(e.to_string()))?;

        let mut scratch = ScratchArea::acquire(&self.scratch_dir)?;
        scratch.write("data.json", &json_data)?;
        let template_path =
            scratch.write("form.typ", &FORM_TEMPLATE.replace("DATA_JSON_PATH", "data.json"))?;
        let png_path = scratch.track("form.png");

        let output = Command::new("typst")
            .arg("compile")
            .arg("--root")
            .arg(scratch.dir())
            .args(["--format", "png", "--ppi"])
            .arg(self.ppi.to_string())
            .arg(&template_path)
            .arg(&png_path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExpenseError::Snapshot(stderr.trim().to_string()));
        }

        image::open(&png_path).map_err(|e| ExpenseError::Snapshot(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct AmountRow {
    label: String,
    amount: String,
}

#[derive(Debug, Serialize)]
struct DeductionRow {
    label: String,
    count: String,
    rate: String,
    amount: String,
}

/// Pre-formatted values for the form template
#[derive(Debug, Serialize)]
struct FormView {
    company: String,
    headline: String,
    name: String,
    purpose: String,
    start_date: String,
    end_date: String,
    plate: String,
    odometer_start: String,
    odometer_end: String,
    distance_km: String,
    mileage: String,
    rail: String,
    taxi: String,
    public_transport: String,
    trip_total: String,
    days_over_8h: String,
    rate_over_8h: String,
    amount_over_8h: String,
    days_24h: String,
    rate_24h: String,
    amount_24h: String,
    deductions: Vec<DeductionRow>,
    per_diem_total: String,
    lodging_actual: String,
    lodging_flat: String,
    lodging_total: String,
    misc: Vec<AmountRow>,
    misc_total: String,
    grand_total: String,
}

fn or_dash(value: String) -> String {
    if value.trim().is_empty() {
        "—".to_string()
    } else {
        value
    }
}

fn money(value: &NumberInput) -> String {
    format_currency(value.value())
}

impl FormView {
    fn new(form: &FormData, totals: &Totals) -> Self {
        let basis = &form.basis;
        let trip = &form.trip;
        let p = &form.per_diem;

        let mut headline = Vec::new();
        if !basis.calendar_week.is_empty() {
            headline.push(format!("KW {}", basis.calendar_week));
        }
        if !basis.name.is_empty() {
            headline.push(basis.name.clone());
        }

        let mut deductions = vec![DeductionRow {
            label: "Frühstück".to_string(),
            count: p.breakfast_count.to_string(),
            rate: money(&p.breakfast_deduction),
            amount: format_currency(p.breakfast_count.value() * p.breakfast_deduction.value()),
        }];
        let optional = [
            ("Mittagessen", &p.lunch_count, &p.lunch_deduction),
            ("Abendessen", &p.dinner_count, &p.dinner_deduction),
        ];
        for (label, count, deduction) in optional {
            if let (Some(count), Some(deduction)) = (count, deduction) {
                deductions.push(DeductionRow {
                    label: label.to_string(),
                    count: count.to_string(),
                    rate: money(deduction),
                    amount: format_currency(count.value() * deduction.value()),
                });
            }
        }

        Self {
            company: basis.company.clone(),
            headline: headline.join(" – "),
            name: basis.name.clone(),
            purpose: basis.purpose.clone(),
            start_date: format_date_de(&basis.start_date),
            end_date: format_date_de(&basis.end_date),
            plate: or_dash(trip.plate.clone()),
            odometer_start: or_dash(trip.odometer_start.to_string()),
            odometer_end: or_dash(trip.odometer_end.to_string()),
            distance_km: trip.distance_km.value().to_string(),
            mileage: format_currency(mileage_allowance(trip.distance_km.value())),
            rail: money(&trip.rail),
            taxi: money(&trip.taxi),
            public_transport: money(&trip.public_transport),
            trip_total: format_currency(totals.trip),
            days_over_8h: p.days_over_8h.to_string(),
            rate_over_8h: money(&p.rate_over_8h),
            amount_over_8h: format_currency(p.days_over_8h.value() * p.rate_over_8h.value()),
            days_24h: p.days_24h.to_string(),
            rate_24h: money(&p.rate_24h),
            amount_24h: format_currency(p.days_24h.value() * p.rate_24h.value()),
            deductions,
            per_diem_total: format_currency(totals.per_diem),
            lodging_actual: money(&form.lodging.actual_cost),
            lodging_flat: money(&form.lodging.flat_rate),
            lodging_total: format_currency(totals.lodging),
            misc: form
                .misc
                .iter()
                .map(|m| AmountRow {
                    label: or_dash(m.label.clone()),
                    amount: money(&m.amount),
                })
                .collect(),
            misc_total: format_currency(totals.misc),
            grand_total: format_currency(totals.grand),
        }
    }
}

/// Typst template for the form snapshot; the data path placeholder is replaced before compiling
const FORM_TEMPLATE: &str = r##"// Reisekostenabrechnung
// Data is loaded from JSON file

#let data = json("DATA_JSON_PATH")

#set page(width: 210mm, height: auto, margin: 18pt, fill: white)
#set text(font: "Helvetica", size: 9pt, lang: "de")

#let cols = (1fr, 1fr, 1fr, 1fr, 80pt)
#let amt(value) = align(right, value)
#let blank = table.cell(colspan: 3)[]
#let subtotal(label, value) = (
  table.cell(colspan: 4, text(weight: "bold", label)),
  amt(text(weight: "bold", value)),
)
#let section(title) = block(above: 14pt, below: 6pt, text(size: 10pt, weight: "bold", title))

#text(size: 9pt)[#data.company]
#v(2pt)
#text(size: 16pt, weight: "bold")[Reisekostenabrechnung]
#v(2pt)
#text(size: 9pt)[#data.headline]

#v(8pt)
#grid(
  columns: (1fr, 1fr),
  gutter: 12pt,
  [*Name:* #data.name \ *Zweck:* #data.purpose],
  [*Beginn:* #data.start_date \ *Ende:* #data.end_date],
)

#section[Fahrtkosten]
#table(
  columns: cols,
  stroke: 0.5pt + black,
  inset: 6pt,
  [Privat-PKW], [Kennzeichen: #data.plate], [Tachostand: #data.odometer_start → #data.odometer_end], [#data.distance_km km × 0,30 €/km], amt(data.mileage),
  [Deutsche Bahn], blank, amt(data.rail),
  [Taxi], blank, amt(data.taxi),
  [Öffentliche Verkehrsmittel], blank, amt(data.public_transport),
  ..subtotal("Zwischensumme Fahrtkosten", data.trip_total),
)

#section[Verpflegungsmehraufwand]
#table(
  columns: cols,
  stroke: 0.5pt + black,
  inset: 6pt,
  [Tage > 8 Std.], [#data.days_over_8h], [Satz #data.rate_over_8h], [], amt(data.amount_over_8h),
  [Tage 24 Std.], [#data.days_24h], [Satz #data.rate_24h], [], amt(data.amount_24h),
  ..data.deductions.map(d => (
    [abzgl. #d.label], [#d.count], [#d.rate pro #d.label], [], amt("- " + d.amount),
  )).flatten(),
  ..subtotal("Zwischensumme", data.per_diem_total),
)

#section[Übernachtungskosten]
#table(
  columns: cols,
  stroke: 0.5pt + black,
  inset: 6pt,
  [Tatsächliche Kosten (ohne Verpflegung)], blank, amt(data.lodging_actual),
  [Pauschale], blank, amt(data.lodging_flat),
  ..subtotal("Zwischensumme", data.lodging_total),
)

#section[Sonstige Auslagen]
#table(
  columns: cols,
  stroke: 0.5pt + black,
  inset: 6pt,
  ..data.misc.map(m => (table.cell(colspan: 4)[#m.label], amt(m.amount))).flatten(),
  ..subtotal("Zwischensumme", data.misc_total),
)

#v(12pt)
#align(right, text(size: 11pt, weight: "bold")[Gesamte Reisekosten: #data.grand_total])
"##;
