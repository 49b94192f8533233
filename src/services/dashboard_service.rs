use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveTime};
use log::debug;
use mongodb::bson::DateTime;

use crate::db::store::{BookingFilter, BookingStore};
use crate::errors::BookingError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::dashboard::{DailyRevenue, DashboardSummary, DateRange, RevenueTotals};
use crate::models::fleet::PricingCatalog;
use crate::services::clock::Clock;

pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Start of the local calendar day containing `at`.
pub fn local_day_start(at: DateTime, offset_minutes: i32) -> DateTime {
    let offset = Duration::minutes(offset_minutes as i64);
    let local = at.to_chrono() + offset;
    let midnight = local.date_naive().and_time(NaiveTime::MIN).and_utc() - offset;
    DateTime::from_chrono(midnight)
}

fn local_date(at: DateTime, offset_minutes: i32) -> String {
    (at.to_chrono() + Duration::minutes(offset_minutes as i64))
        .format("%Y-%m-%d")
        .to_string()
}

fn shift_days(at: DateTime, days: i64) -> DateTime {
    DateTime::from_millis(at.timestamp_millis() + days * 86_400_000)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Read-only statistics over bookings created in a window.
pub struct DashboardService<S> {
    store: S,
    catalog: Arc<PricingCatalog>,
    clock: Arc<dyn Clock>,
}

impl<S: BookingStore> DashboardService<S> {
    pub fn new(store: S, catalog: Arc<PricingCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    /// Summarizes `range`, or the last 30 local days including today.
    pub async fn summarize(
        &self,
        range: Option<DateRange>,
    ) -> Result<DashboardSummary, BookingError> {
        let offset = self.catalog.utc_offset_minutes;
        let today_start = local_day_start(self.clock.now(), offset);
        let today = DateRange {
            from: today_start,
            to: shift_days(today_start, 1),
        };
        let range = match range {
            Some(range) if range.from >= range.to => {
                return Err(BookingError::InvalidInput(
                    "dashboard range must end after it starts".to_string(),
                ))
            }
            Some(range) => range,
            None => DateRange {
                from: shift_days(today.to, -DEFAULT_RANGE_DAYS),
                to: today.to,
            },
        };

        let window = BookingFilter::created_between(
            range.from.min(today.from),
            range.to.max(today.to),
        );
        let bookings = self.store.query(&window).await?;
        debug!(
            "Summarizing {} bookings between {} and {}",
            bookings.len(),
            range.from,
            range.to
        );
        Ok(aggregate(&bookings, range, today, offset))
    }
}

/// Pure aggregation used by [`DashboardService::summarize`].
pub fn aggregate(
    bookings: &[Booking],
    range: DateRange,
    today: DateRange,
    utc_offset_minutes: i32,
) -> DashboardSummary {
    let mut status_distribution: BTreeMap<BookingStatus, usize> =
        BookingStatus::ALL.iter().map(|s| (*s, 0)).collect();
    let mut type_distribution = BTreeMap::new();
    let mut daily: BTreeMap<String, DailyRevenue> = BTreeMap::new();
    let mut totals = RevenueTotals {
        total_revenue: 0.0,
        completed_count: 0,
        avg_booking_value: 0.0,
        pending_revenue: 0.0,
        refunded_total: 0.0,
    };

    let today_count = bookings
        .iter()
        .filter(|b| today.contains(b.created_at))
        .count();

    let in_period: Vec<&Booking> = bookings
        .iter()
        .filter(|b| range.contains(b.created_at))
        .collect();

    for booking in &in_period {
        *status_distribution.entry(booking.status).or_insert(0) += 1;
        *type_distribution.entry(booking.booking_type).or_insert(0) += 1;

        let total = booking.pricing.total;
        match booking.status {
            BookingStatus::Completed => {
                totals.total_revenue += total;
                totals.completed_count += 1;

                let day_of = booking
                    .completed_at
                    .or(booking.end_time)
                    .unwrap_or(booking.created_at);
                let date = local_date(day_of, utc_offset_minutes);
                let entry = daily.entry(date.clone()).or_insert(DailyRevenue {
                    date,
                    revenue: 0.0,
                    completed_count: 0,
                });
                entry.revenue += total;
                entry.completed_count += 1;
            }
            BookingStatus::Cancelled => {
                if let Some(cancellation) = &booking.cancellation {
                    totals.refunded_total += cancellation.refund_amount;
                }
            }
            status if !status.is_terminal() => totals.pending_revenue += total,
            _ => {}
        }
    }

    if totals.completed_count > 0 {
        totals.avg_booking_value =
            round_cents(totals.total_revenue / totals.completed_count as f64);
    }
    totals.total_revenue = round_cents(totals.total_revenue);
    totals.pending_revenue = round_cents(totals.pending_revenue);
    totals.refunded_total = round_cents(totals.refunded_total);

    DashboardSummary {
        from: range.from.to_chrono().to_rfc3339(),
        to: range.to.to_chrono().to_rfc3339(),
        today_count,
        period_count: in_period.len(),
        status_distribution,
        revenue_totals: totals,
        type_distribution,
        daily_revenue: daily.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{
        BookingType, Cancellation, FareBreakdown, Passengers, Schedule, TripType,
    };
    use chrono::{TimeZone, Utc};
    use mongodb::bson::oid::ObjectId;

    const IST: i32 = 330;

    fn at(day: u32, hour: u32) -> DateTime {
        DateTime::from_chrono(Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap())
    }

    fn booking(status: BookingStatus, total: f64, created_at: DateTime) -> Booking {
        Booking {
            id: Some(ObjectId::new()),
            booking_code: format!("TB-TEST-{}", ObjectId::new()),
            customer_id: ObjectId::new(),
            booking_type: BookingType::CityRide,
            trip_type: TripType::OneWay,
            pickup_address: "Indiranagar".to_string(),
            dropoff_address: None,
            stops: vec![],
            schedule: Schedule {
                start_time: created_at,
                end_time: created_at,
            },
            passengers: Passengers::new(1, 0, 0),
            distance_km: 10.0,
            duration_hours: 1.0,
            pricing: FareBreakdown {
                vehicle_category: "Sedan".to_string(),
                bracket: None,
                base_price: 0.0,
                distance_charge: 0.0,
                time_charge: 0.0,
                driver_allowance: 0.0,
                minimum_fare_adjustment: 0.0,
                subtotal: total,
                multipliers: vec![],
                multiplier_adjustments: 0.0,
                discount: 0.0,
                total,
            },
            special_requests: None,
            package_id: None,
            driver_id: None,
            vehicle_id: None,
            status,
            status_history: vec![],
            cancellation: None,
            started_at: None,
            completed_at: None,
            end_time: None,
            version: 0,
            created_at,
            updated_at: None,
        }
    }

    fn october() -> DateRange {
        DateRange {
            from: at(1, 0),
            to: at(31, 0),
        }
    }

    fn day(d: u32) -> DateRange {
        DateRange {
            from: at(d, 0),
            to: at(d + 1, 0),
        }
    }

    #[test]
    fn revenue_counts_only_completed_bookings() {
        let bookings = vec![
            booking(BookingStatus::Completed, 1000.0, at(10, 6)),
            booking(BookingStatus::Pending, 500.0, at(10, 7)),
        ];
        let summary = aggregate(&bookings, october(), day(10), IST);

        assert_eq!(summary.revenue_totals.total_revenue, 1000.0);
        assert_eq!(summary.revenue_totals.avg_booking_value, 1000.0);
        assert_eq!(summary.revenue_totals.completed_count, 1);
        assert_eq!(summary.revenue_totals.pending_revenue, 500.0);
        assert_eq!(summary.period_count, 2);
        assert_eq!(summary.today_count, 2);
    }

    #[test]
    fn average_is_zero_without_completed_bookings() {
        let bookings = vec![booking(BookingStatus::Confirmed, 800.0, at(3, 6))];
        let summary = aggregate(&bookings, october(), day(10), IST);
        assert_eq!(summary.revenue_totals.avg_booking_value, 0.0);
        assert_eq!(summary.revenue_totals.total_revenue, 0.0);
        assert_eq!(summary.today_count, 0);
        assert!(summary.daily_revenue.is_empty());
    }

    #[test]
    fn distributions_cover_the_period_only() {
        let mut cancelled = booking(BookingStatus::Cancelled, 900.0, at(5, 6));
        cancelled.booking_type = BookingType::Outstation;
        cancelled.cancellation = Some(Cancellation {
            reason: "plans changed".to_string(),
            tier: Some("before_1_hour".to_string()),
            fee: 100.0,
            refund_amount: 800.0,
            cancelled_at: at(5, 7),
            cancelled_by: None,
        });
        let bookings = vec![
            cancelled,
            booking(BookingStatus::Completed, 400.0, at(5, 8)),
            // September, outside the range.
            booking(BookingStatus::Completed, 700.0, DateTime::from_chrono(
                Utc.with_ymd_and_hms(2026, 9, 29, 6, 0, 0).unwrap(),
            )),
        ];
        let summary = aggregate(&bookings, october(), day(5), IST);

        assert_eq!(summary.period_count, 2);
        assert_eq!(summary.status_distribution[&BookingStatus::Cancelled], 1);
        assert_eq!(summary.status_distribution[&BookingStatus::Completed], 1);
        assert_eq!(summary.status_distribution[&BookingStatus::Pending], 0);
        assert_eq!(summary.type_distribution[&BookingType::Outstation], 1);
        assert_eq!(summary.type_distribution[&BookingType::CityRide], 1);
        assert_eq!(summary.revenue_totals.refunded_total, 800.0);
        assert_eq!(summary.revenue_totals.total_revenue, 400.0);
    }

    #[test]
    fn daily_revenue_uses_local_calendar_days() {
        // 20:00 UTC is past midnight at +05:30.
        let mut late = booking(BookingStatus::Completed, 300.0, at(7, 10));
        late.completed_at = Some(at(7, 20));
        let mut early = booking(BookingStatus::Completed, 200.0, at(7, 9));
        early.completed_at = Some(at(7, 12));

        let summary = aggregate(&[late, early], october(), day(7), IST);
        let dates: Vec<&str> = summary.daily_revenue.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-10-07", "2026-10-08"]);
        assert_eq!(summary.daily_revenue[0].revenue, 200.0);
        assert_eq!(summary.daily_revenue[1].revenue, 300.0);
    }

    #[test]
    fn local_day_start_honours_offset() {
        // 2026-10-10 02:00 IST is 2026-10-09 20:30 UTC.
        let now = DateTime::from_chrono(Utc.with_ymd_and_hms(2026, 10, 9, 20, 30, 0).unwrap());
        let start = local_day_start(now, IST);
        assert_eq!(
            start,
            DateTime::from_chrono(Utc.with_ymd_and_hms(2026, 10, 9, 18, 30, 0).unwrap())
        );
    }
}
