use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier sold through the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Day,
    Week,
    Month,
}

/// Price of a plan in minor-unit-free provider terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    pub amount: u32,
    pub currency: &'static str,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Day, Plan::Week, Plan::Month];

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Day => "day",
            Plan::Week => "week",
            Plan::Month => "month",
        }
    }

    pub fn duration_days(self) -> i64 {
        match self {
            Plan::Day => 1,
            Plan::Week => 7,
            Plan::Month => 30,
        }
    }

    pub fn price(self) -> Price {
        let amount = match self {
            Plan::Day => 5,
            Plan::Week => 12,
            Plan::Month => 25,
        };
        Price {
            amount,
            currency: "gbp",
        }
    }

    /// The `[starts_at, ends_at)` window of a key bought at `now`.
    pub fn validity_window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now, now + Duration::days(self.duration_days()))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|plan| plan.as_str() == s)
            .ok_or_else(|| format!("unknown plan: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_spans_the_plan_duration() {
        let now = Utc.with_ymd_and_hms(2026, 1, 30, 12, 0, 0).unwrap();
        let (starts, ends) = Plan::Week.validity_window(now);
        assert_eq!(starts, now);
        assert_eq!(ends, Utc.with_ymd_and_hms(2026, 2, 6, 12, 0, 0).unwrap());
    }

    #[test]
    fn parses_only_known_plans() {
        assert_eq!("month".parse::<Plan>(), Ok(Plan::Month));
        assert!("year".parse::<Plan>().is_err());
        assert!("".parse::<Plan>().is_err());
    }
}
