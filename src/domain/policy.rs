//! Per-category polling cadence.
//!
//! Each [`ResourceCategory`] maps to a base interval reflecting how quickly that
//! backend usually moves a record along, and an attempt budget sized so that
//! `base interval × budget` covers a sensible total wait for the category.

use super::category::ResourceCategory;
use super::status::StatusClass;
use std::time::Duration;

/// No computed interval is ever shorter than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPolicy {
    pub base_interval: Duration,
    pub max_attempts: u32,
}

impl IntervalPolicy {
    pub const fn for_category(category: ResourceCategory) -> Self {
        match category {
            // 20 minutes
            ResourceCategory::Flight => Self::new(30, 40),
            // 30 minutes
            ResourceCategory::Insurance => Self::new(45, 40),
            // 30 minutes
            ResourceCategory::Hotel => Self::new(60, 30),
            // 1 hour
            ResourceCategory::Package => Self::new(120, 30),
            // 4 hours
            ResourceCategory::Visa => Self::new(300, 48),
        }
    }

    const fn new(base_secs: u64, max_attempts: u32) -> Self {
        Self {
            base_interval: Duration::from_secs(base_secs),
            max_attempts,
        }
    }

    /// Next delay given the most recently observed status, if any.
    pub fn interval(&self, status: Option<&str>) -> Duration {
        let multiplier = status.map_or(1.0, |token| status_multiplier(StatusClass::of(token)));
        let millis = (self.base_interval.as_millis() as f64 * multiplier).round() as u64;
        Duration::from_millis(millis).max(MIN_POLL_INTERVAL)
    }
}

fn status_multiplier(class: StatusClass) -> f64 {
    match class {
        StatusClass::InProgress => 0.5,
        StatusClass::Confirmed => 2.0,
        StatusClass::Failed => 0.25,
        StatusClass::Cancelled => 4.0,
        StatusClass::Unrecognized => 1.0,
    }
}

pub fn compute_interval(category: ResourceCategory, status: Option<&str>) -> Duration {
    IntervalPolicy::for_category(category).interval(status)
}

pub fn compute_max_attempts(category: ResourceCategory) -> u32 {
    IntervalPolicy::for_category(category).max_attempts
}
