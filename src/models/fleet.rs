use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::errors::BookingError;

const EMBEDDED_CATALOG: &str = include_str!("../../config/pricing_catalog.json");

/// A distance range with its own per-km rate and minimum fare.
///
/// Ranges are half-open: `min_km <= distance < max_km`. The last bracket has
/// no upper bound.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutstationBracket {
    pub label: String,
    pub min_km: f64,
    pub max_km: Option<f64>,
    pub per_km: f64,
    pub driver_allowance: f64,
    pub minimum_fare: f64,
}

impl OutstationBracket {
    pub fn contains(&self, distance_km: f64) -> bool {
        distance_km >= self.min_km && self.max_km.map_or(true, |max| distance_km < max)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CancellationTier {
    pub label: String,
    /// Notice (minutes before pickup) required for this tier. `None` matches
    /// any notice, including cancellations after the pickup time.
    pub min_minutes_before: Option<i64>,
    pub fee: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VehicleCategory {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub seating_capacity: u32,
    pub luggage_capacity: u32,
    pub base_price: f64,
    pub per_km: f64,
    pub per_hour: f64,
    pub outstation: Vec<OutstationBracket>,
    pub round_trip_discount_percent: f64,
    pub multi_city_multiplier: f64,
    pub night_charge_multiplier: f64,
    pub peak_hour_multiplier: f64,
    pub cancellation_fees: Vec<CancellationTier>,
}

impl VehicleCategory {
    pub fn bracket_for(&self, distance_km: f64) -> Option<&OutstationBracket> {
        self.outstation.iter().find(|b| b.contains(distance_km))
    }

    /// Cancellation tiers ordered from the most notice to the least, with the
    /// catch-all tier last.
    pub fn cancellation_tiers(&self) -> Vec<&CancellationTier> {
        let mut tiers: Vec<&CancellationTier> = self.cancellation_fees.iter().collect();
        tiers.sort_by(|a, b| match (a.min_minutes_before, b.min_minutes_before) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        tiers
    }

    fn validate(&self) -> Result<(), String> {
        let name = &self.name;
        if name.trim().is_empty() {
            return Err("category name must not be empty".to_string());
        }
        if self.seating_capacity == 0 {
            return Err(format!("{}: seating capacity must be at least 1", name));
        }
        for (field, rate) in [
            ("base_price", self.base_price),
            ("per_km", self.per_km),
            ("per_hour", self.per_hour),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(format!("{}: {} must be a non-negative number", name, field));
            }
        }
        for (field, multiplier) in [
            ("multi_city_multiplier", self.multi_city_multiplier),
            ("night_charge_multiplier", self.night_charge_multiplier),
            ("peak_hour_multiplier", self.peak_hour_multiplier),
        ] {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(format!("{}: {} must be at least 1.0", name, field));
            }
        }
        if !(0.0..=100.0).contains(&self.round_trip_discount_percent) {
            return Err(format!(
                "{}: round trip discount must be between 0 and 100 percent",
                name
            ));
        }

        // Brackets start at zero, touch each other and only the last one is open-ended.
        let Some(first) = self.outstation.first() else {
            return Err(format!("{}: at least one outstation bracket is required", name));
        };
        if first.min_km != 0.0 {
            return Err(format!("{}: first outstation bracket must start at 0 km", name));
        }
        for (index, bracket) in self.outstation.iter().enumerate() {
            if bracket.per_km < 0.0 || bracket.driver_allowance < 0.0 || bracket.minimum_fare < 0.0 {
                return Err(format!("{}: bracket {} has a negative rate", name, bracket.label));
            }
            match (bracket.max_km, self.outstation.get(index + 1)) {
                (Some(max), Some(next)) => {
                    if max <= bracket.min_km {
                        return Err(format!("{}: bracket {} is empty", name, bracket.label));
                    }
                    if next.min_km != max {
                        return Err(format!(
                            "{}: bracket {} does not continue from {}",
                            name, next.label, bracket.label
                        ));
                    }
                }
                (None, None) => {}
                (Some(_), None) => {
                    return Err(format!("{}: last bracket {} must be open-ended", name, bracket.label));
                }
                (None, Some(_)) => {
                    return Err(format!(
                        "{}: only the last bracket may be open-ended ({})",
                        name, bracket.label
                    ));
                }
            }
        }

        if self.cancellation_fees.is_empty() {
            return Err(format!("{}: cancellation fee schedule is empty", name));
        }
        if self
            .cancellation_fees
            .iter()
            .filter(|t| t.min_minutes_before.is_none())
            .count()
            > 1
        {
            return Err(format!("{}: only one catch-all cancellation tier is allowed", name));
        }
        let tiers = self.cancellation_tiers();
        for pair in tiers.windows(2) {
            if pair[1].fee < pair[0].fee {
                return Err(format!(
                    "{}: cancellation fee for {} is cheaper than {}",
                    name, pair[1].label, pair[0].label
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    /// Windows may wrap past midnight (`22 -> 6`).
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Immutable pricing configuration loaded once at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PricingCatalog {
    /// Fixed offset used to read local time-of-day and calendar days.
    pub utc_offset_minutes: i32,
    /// City rides and airport transfers beyond this distance are priced on
    /// the outstation brackets.
    pub city_limit_km: f64,
    pub night_hours: HourWindow,
    pub peak_hours: Vec<HourWindow>,
    pub categories: Vec<VehicleCategory>,
}

impl PricingCatalog {
    pub fn embedded_default() -> Result<Self, BookingError> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self, BookingError> {
        let catalog: PricingCatalog = serde_json::from_str(raw)
            .map_err(|e| BookingError::Configuration(format!("invalid pricing catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn with_categories(mut self, categories: Vec<VehicleCategory>) -> Result<Self, BookingError> {
        self.categories = categories;
        self.validate()?;
        Ok(self)
    }

    pub fn category(&self, name: &str) -> Option<&VehicleCategory> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        let invalid = |message: String| BookingError::Configuration(message);

        if self.categories.is_empty() {
            return Err(invalid("pricing catalog has no vehicle categories".to_string()));
        }
        if !self.city_limit_km.is_finite() || self.city_limit_km < 0.0 {
            return Err(invalid("city_limit_km must be a non-negative number".to_string()));
        }
        for window in std::iter::once(&self.night_hours).chain(self.peak_hours.iter()) {
            if window.start > 23 || window.end > 24 {
                return Err(invalid(format!(
                    "hour window {}-{} is outside the day",
                    window.start, window.end
                )));
            }
        }
        for (index, category) in self.categories.iter().enumerate() {
            category.validate().map_err(invalid)?;
            if self.categories[..index]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&category.name))
            {
                return Err(invalid(format!("duplicate vehicle category {}", category.name)));
            }
        }
        Ok(())
    }
}
