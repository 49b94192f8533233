use std::collections::BTreeMap;

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::models::booking::{BookingStatus, BookingType};

/// Half-open `[from, to)` window over booking creation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub from: DateTime,
    pub to: DateTime,
}

impl DateRange {
    pub fn contains(&self, at: DateTime) -> bool {
        at >= self.from && at < self.to
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RevenueTotals {
    pub total_revenue: f64,
    pub completed_count: usize,
    pub avg_booking_value: f64,
    pub pending_revenue: f64,
    pub refunded_total: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyRevenue {
    pub date: String,
    pub revenue: f64,
    pub completed_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DashboardSummary {
    pub from: String,
    pub to: String,
    pub today_count: usize,
    pub period_count: usize,
    pub status_distribution: BTreeMap<BookingStatus, usize>,
    pub revenue_totals: RevenueTotals,
    pub type_distribution: BTreeMap<BookingType, usize>,
    pub daily_revenue: Vec<DailyRevenue>,
}
