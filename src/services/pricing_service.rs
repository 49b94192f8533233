use chrono::{Duration, Timelike};
use mongodb::bson::DateTime;

use crate::errors::BookingError;
use crate::models::booking::{
    AppliedMultiplier, BookingType, FareBreakdown, MultiplierKind, Passengers, TripType,
};
use crate::models::fleet::{PricingCatalog, VehicleCategory};

#[derive(Debug, Clone)]
pub struct PricingInput {
    pub distance_km: f64,
    pub duration_hours: f64,
    pub booking_type: BookingType,
    pub trip_type: TripType,
    pub is_night_trip: bool,
    pub is_peak_hour: bool,
    pub passengers: Passengers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationCharge {
    pub label: String,
    pub fee: f64,
}

pub struct PricingService;

fn to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

impl PricingService {
    /// Outstation and package trips always use the distance brackets; city
    /// trips switch to them once they leave the city limit.
    pub fn uses_outstation_rates(
        catalog: &PricingCatalog,
        booking_type: BookingType,
        distance_km: f64,
    ) -> bool {
        matches!(booking_type, BookingType::Outstation | BookingType::PackageTour)
            || distance_km > catalog.city_limit_km
    }

    /// Night and peak flags for a pickup time, read in the catalog's local
    /// offset. Night wins when both windows match.
    pub fn time_flags(catalog: &PricingCatalog, pickup: DateTime) -> (bool, bool) {
        let local = pickup.to_chrono() + Duration::minutes(catalog.utc_offset_minutes as i64);
        let hour = local.hour();
        let night = catalog.night_hours.contains(hour);
        let peak = !night && catalog.peak_hours.iter().any(|w| w.contains(hour));
        (night, peak)
    }

    /// Deterministic fare for a trip.
    ///
    /// Order of operations: distance/time charges, minimum fare floor,
    /// night *or* peak multiplier, multi-city multiplier, round trip discount,
    /// then rounding to a whole currency unit.
    pub fn quote(
        catalog: &PricingCatalog,
        category_name: &str,
        input: &PricingInput,
    ) -> Result<FareBreakdown, BookingError> {
        if !input.distance_km.is_finite() || input.distance_km < 0.0 {
            return Err(BookingError::InvalidInput(
                "distance_km must be a non-negative number".to_string(),
            ));
        }
        if !input.duration_hours.is_finite() || input.duration_hours < 0.0 {
            return Err(BookingError::InvalidInput(
                "duration_hours must be a non-negative number".to_string(),
            ));
        }
        let category = catalog
            .category(category_name)
            .ok_or_else(|| BookingError::InvalidCategory(category_name.to_string()))?;
        if input.passengers.seated() > category.seating_capacity {
            return Err(BookingError::InvalidInput(format!(
                "{} seats {} passengers, {} requested",
                category.name,
                category.seating_capacity,
                input.passengers.seated()
            )));
        }

        let outstation =
            Self::uses_outstation_rates(catalog, input.booking_type, input.distance_km);
        let (bracket, base_price, distance_charge, time_charge, driver_allowance, floor) =
            if outstation {
                let bracket = category.bracket_for(input.distance_km).ok_or_else(|| {
                    BookingError::InvalidCategory(format!(
                        "{} has no outstation rate for {} km",
                        category.name, input.distance_km
                    ))
                })?;
                (
                    Some(bracket.label.clone()),
                    0.0,
                    input.distance_km * bracket.per_km,
                    0.0,
                    bracket.driver_allowance,
                    bracket.minimum_fare,
                )
            } else {
                (
                    None,
                    category.base_price,
                    input.distance_km * category.per_km,
                    input.duration_hours * category.per_hour,
                    0.0,
                    category.base_price,
                )
            };

        let subtotal = base_price + distance_charge + time_charge + driver_allowance;
        let minimum_fare_adjustment = (floor - subtotal).max(0.0);
        let floored = subtotal + minimum_fare_adjustment;

        let multipliers = Self::multipliers(category, input);
        let adjusted = multipliers.iter().fold(floored, |amount, m| amount * m.factor);

        let discount = if input.trip_type == TripType::RoundTrip {
            adjusted * category.round_trip_discount_percent / 100.0
        } else {
            0.0
        };
        let total = (adjusted - discount).round().max(0.0);

        Ok(FareBreakdown {
            vehicle_category: category.name.clone(),
            bracket,
            base_price: to_cents(base_price),
            distance_charge: to_cents(distance_charge),
            time_charge: to_cents(time_charge),
            driver_allowance: to_cents(driver_allowance),
            minimum_fare_adjustment: to_cents(minimum_fare_adjustment),
            subtotal: to_cents(floored),
            multipliers,
            multiplier_adjustments: to_cents(adjusted - floored),
            discount: to_cents(discount),
            total,
        })
    }

    fn multipliers(category: &VehicleCategory, input: &PricingInput) -> Vec<AppliedMultiplier> {
        let mut applied = Vec::new();
        if input.is_night_trip {
            applied.push(AppliedMultiplier {
                kind: MultiplierKind::Night,
                factor: category.night_charge_multiplier,
            });
        } else if input.is_peak_hour {
            applied.push(AppliedMultiplier {
                kind: MultiplierKind::PeakHour,
                factor: category.peak_hour_multiplier,
            });
        }
        if input.trip_type == TripType::MultiCity {
            applied.push(AppliedMultiplier {
                kind: MultiplierKind::MultiCity,
                factor: category.multi_city_multiplier,
            });
        }
        applied
    }

    /// Flat fee for cancelling `minutes_before_pickup` minutes ahead of the
    /// pickup (negative once the pickup time has passed). Picks the tier with
    /// the most notice that the cancellation still satisfies.
    pub fn cancellation_fee(
        category: &VehicleCategory,
        minutes_before_pickup: i64,
    ) -> CancellationCharge {
        let tiers = category.cancellation_tiers();
        let tier = tiers
            .iter()
            .find(|t| t.min_minutes_before.map_or(true, |min| minutes_before_pickup >= min))
            .or(tiers.last());
        match tier {
            Some(tier) => CancellationCharge {
                label: tier.label.clone(),
                fee: tier.fee,
            },
            None => CancellationCharge {
                label: "free".to_string(),
                fee: 0.0,
            },
        }
    }
}
