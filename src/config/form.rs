use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ExpenseError, Result};
use crate::units::{iso_calendar_week, NumberInput};

/// Everything the user entered for one expense report
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FormData {
    #[serde(default)]
    pub basis: Basis,
    #[serde(default)]
    pub trip: Trip,
    #[serde(default)]
    pub per_diem: PerDiem,
    #[serde(default)]
    pub lodging: Lodging,
    #[serde(default)]
    pub misc: Vec<MiscExpense>,
    #[serde(default)]
    pub attachments: Vec<AttachmentEntry>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Basis {
    pub name: String,
    pub purpose: String,
    pub start_date: String,
    pub end_date: String,
    pub calendar_week: String,
    /// Derive `calendar_week` from `start_date`
    pub auto_week: bool,
    pub company: String,
}

impl Default for Basis {
    fn default() -> Self {
        Self {
            name: String::new(),
            purpose: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            calendar_week: String::new(),
            auto_week: true,
            company: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Trip {
    pub plate: String,
    pub odometer_start: NumberInput,
    pub odometer_end: NumberInput,
    pub distance_km: NumberInput,
    pub public_transport: NumberInput,
    pub rail: NumberInput,
    pub taxi: NumberInput,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PerDiem {
    pub days_over_8h: NumberInput,
    pub days_24h: NumberInput,
    pub rate_over_8h: NumberInput,
    pub rate_24h: NumberInput,
    pub breakfast_count: NumberInput,
    pub breakfast_deduction: NumberInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lunch_count: Option<NumberInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lunch_deduction: Option<NumberInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dinner_count: Option<NumberInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dinner_deduction: Option<NumberInput>,
}

impl Default for PerDiem {
    fn default() -> Self {
        Self {
            days_over_8h: NumberInput::Number(0.0),
            days_24h: NumberInput::Number(0.0),
            rate_over_8h: NumberInput::Number(14.0),
            rate_24h: NumberInput::Number(28.0),
            breakfast_count: NumberInput::Number(0.0),
            breakfast_deduction: NumberInput::Number(5.6),
            lunch_count: None,
            lunch_deduction: None,
            dinner_count: None,
            dinner_deduction: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Lodging {
    pub actual_cost: NumberInput,
    pub flat_rate: NumberInput,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MiscExpense {
    pub id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub amount: NumberInput,
}

/// A receipt as uploaded: the file reference plus its declared media type
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AttachmentEntry {
    pub name: String,
    pub path: PathBuf,
    pub media_type: String,
}

impl FormData {
    /// Bring derived fields in line with their inputs. Call after every mutation.
    pub fn recompute(&mut self) {
        if self.basis.auto_week && !self.basis.start_date.trim().is_empty() {
            self.basis.calendar_week = iso_calendar_week(&self.basis.start_date);
        }

        let trip = &mut self.trip;
        if !trip.odometer_start.is_blank() && !trip.odometer_end.is_blank() {
            let diff = (trip.odometer_end.value() - trip.odometer_start.value()).max(0.0);
            trip.distance_km = NumberInput::Number(diff);
        }
    }

    /// Names of required basis fields that are still empty
    pub fn missing_required(&self) -> Vec<&'static str> {
        let b = &self.basis;
        [
            ("name", &b.name),
            ("purpose", &b.purpose),
            ("start_date", &b.start_date),
            ("end_date", &b.end_date),
            ("company", &b.company),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// Append a misc expense and return its id
    pub fn add_misc(&mut self, label: &str, amount: NumberInput) -> u64 {
        let id = self.misc.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        self.misc.push(MiscExpense {
            id,
            label: label.to_string(),
            amount,
        });
        id
    }

    pub fn remove_misc(&mut self, id: u64) -> Result<MiscExpense> {
        let idx = self
            .misc
            .iter()
            .position(|m| m.id == id)
            .ok_or(ExpenseError::ExpenseNotFound(id))?;
        Ok(self.misc.remove(idx))
    }

    /// Remove an attachment by its 1-based position
    pub fn remove_attachment(&mut self, index: usize) -> Result<AttachmentEntry> {
        if index == 0 || index > self.attachments.len() {
            return Err(ExpenseError::InvalidAttachmentIndex {
                index,
                count: self.attachments.len(),
            });
        }
        Ok(self.attachments.remove(index - 1))
    }

    /// Set a single field addressed as `section.field`, then recompute
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let text = || value.to_string();
        let number = || NumberInput::Text(value.to_string());

        match key {
            "basis.name" => self.basis.name = text(),
            "basis.purpose" => self.basis.purpose = text(),
            "basis.start_date" => self.basis.start_date = text(),
            "basis.end_date" => self.basis.end_date = text(),
            "basis.calendar_week" => {
                self.basis.calendar_week = text();
                self.basis.auto_week = false;
            }
            "basis.auto_week" => {
                self.basis.auto_week = value.parse().map_err(|_| ExpenseError::InvalidValue {
                    field: key.to_string(),
                    value: value.to_string(),
                    reason: "expected true or false".to_string(),
                })?
            }
            "basis.company" => self.basis.company = text(),
            "trip.plate" => self.trip.plate = text(),
            "trip.odometer_start" => self.trip.odometer_start = number(),
            "trip.odometer_end" => self.trip.odometer_end = number(),
            "trip.distance_km" => self.trip.distance_km = number(),
            "trip.public_transport" => self.trip.public_transport = number(),
            "trip.rail" => self.trip.rail = number(),
            "trip.taxi" => self.trip.taxi = number(),
            "per_diem.days_over_8h" => self.per_diem.days_over_8h = number(),
            "per_diem.days_24h" => self.per_diem.days_24h = number(),
            "per_diem.rate_over_8h" => self.per_diem.rate_over_8h = number(),
            "per_diem.rate_24h" => self.per_diem.rate_24h = number(),
            "per_diem.breakfast_count" => self.per_diem.breakfast_count = number(),
            "per_diem.breakfast_deduction" => self.per_diem.breakfast_deduction = number(),
            "per_diem.lunch_count" => self.per_diem.lunch_count = Some(number()),
            "per_diem.lunch_deduction" => self.per_diem.lunch_deduction = Some(number()),
            "per_diem.dinner_count" => self.per_diem.dinner_count = Some(number()),
            "per_diem.dinner_deduction" => self.per_diem.dinner_deduction = Some(number()),
            "lodging.actual_cost" => self.lodging.actual_cost = number(),
            "lodging.flat_rate" => self.lodging.flat_rate = number(),
            _ => return Err(ExpenseError::UnknownField(key.to_string())),
        }

        self.recompute();
        Ok(())
    }
}

/// Field keys accepted by [`FormData::set_field`]
pub const FIELD_KEYS: &[&str] = &[
    "basis.name",
    "basis.purpose",
    "basis.start_date",
    "basis.end_date",
    "basis.calendar_week",
    "basis.auto_week",
    "basis.company",
    "trip.plate",
    "trip.odometer_start",
    "trip.odometer_end",
    "trip.distance_km",
    "trip.public_transport",
    "trip.rail",
    "trip.taxi",
    "per_diem.days_over_8h",
    "per_diem.days_24h",
    "per_diem.rate_over_8h",
    "per_diem.rate_24h",
    "per_diem.breakfast_count",
    "per_diem.breakfast_deduction",
    "per_diem.lunch_count",
    "per_diem.lunch_deduction",
    "per_diem.dinner_count",
    "per_diem.dinner_deduction",
    "lodging.actual_cost",
    "lodging.flat_rate",
];
