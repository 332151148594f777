use serde::Serialize;

use crate::config::{FormData, Lodging, MiscExpense, PerDiem, Trip};
use crate::units::NumberInput;

/// Mileage allowance per kilometre for a private car
pub const MILEAGE_RATE: f64 = 0.30;

/// Sums of every expense group plus the grand total
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub trip: f64,
    pub per_diem: f64,
    pub lodging: f64,
    pub misc: f64,
    pub grand: f64,
}

impl Totals {
    pub fn compute(form: &FormData) -> Self {
        let trip = trip_total(&form.trip);
        let per_diem = per_diem_total(&form.per_diem);
        let lodging = lodging_total(&form.lodging);
        let misc = misc_total(&form.misc);

        Self {
            trip,
            per_diem,
            lodging,
            misc,
            grand: trip + per_diem + lodging + misc,
        }
    }
}

/// Allowance for the driven distance; the distance is floored to two decimals and never negative
pub fn mileage_allowance(distance_km: f64) -> f64 {
    let km = ((distance_km * 100.0).floor() / 100.0).max(0.0);
    km * MILEAGE_RATE
}

pub fn trip_total(trip: &Trip) -> f64 {
    mileage_allowance(trip.distance_km.value())
        + trip.public_transport.value()
        + trip.rail.value()
        + trip.taxi.value()
}

pub fn per_diem_total(per_diem: &PerDiem) -> f64 {
    let p = per_diem;
    let optional = |count: &Option<NumberInput>, deduction: &Option<NumberInput>| {
        match (count, deduction) {
            (Some(c), Some(d)) => c.value() * d.value(),
            _ => 0.0,
        }
    };

    let gross = p.days_over_8h.value() * p.rate_over_8h.value()
        + p.days_24h.value() * p.rate_24h.value();
    let deductions = p.breakfast_count.value() * p.breakfast_deduction.value()
        + optional(&p.lunch_count, &p.lunch_deduction)
        + optional(&p.dinner_count, &p.dinner_deduction);

    (gross - deductions).max(0.0)
}

pub fn lodging_total(lodging: &Lodging) -> f64 {
    lodging.actual_cost.value() + lodging.flat_rate.value()
}

pub fn misc_total(misc: &[MiscExpense]) -> f64 {
    misc.iter().map(|m| m.amount.value()).sum()
}
