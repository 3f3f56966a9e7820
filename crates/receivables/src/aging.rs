//! Aging of outstanding balances by days past due.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tokoledger_core::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "1-30")]
    Days1To30,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "90+")]
    Over90,
}

impl AgingBucket {
    pub fn for_days_overdue(days: i64) -> Self {
        match days {
            i64::MIN..=0 => AgingBucket::Current,
            1..=30 => AgingBucket::Days1To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }
}

/// Bucket for an open balance; `None` when nothing is outstanding.
///
/// Debts without a due date are always current.
pub fn aging(outstanding: Money, due_date: Option<NaiveDate>, today: NaiveDate) -> Option<AgingBucket> {
    if !outstanding.is_positive() {
        return None;
    }
    Some(match due_date {
        Some(due) => AgingBucket::for_days_overdue((today - due).num_days()),
        None => AgingBucket::Current,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub current: Money,
    #[serde(rename = "1-30")]
    pub days_1_30: Money,
    #[serde(rename = "31-60")]
    pub days_31_60: Money,
    #[serde(rename = "61-90")]
    pub days_61_90: Money,
    #[serde(rename = "90+")]
    pub over_90: Money,
    pub total: Money,
}

impl AgingReport {
    pub fn add(&mut self, outstanding: Money, due_date: Option<NaiveDate>, today: NaiveDate) {
        let Some(bucket) = aging(outstanding, due_date, today) else {
            return;
        };
        let slot = match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days1To30 => &mut self.days_1_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Over90 => &mut self.over_90,
        };
        *slot += outstanding;
        self.total += outstanding;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn bucket_boundaries() {
        let today = d(2024, 6, 30);
        let m = Money::new(1);
        assert_eq!(aging(m, Some(d(2024, 6, 30)), today), Some(AgingBucket::Current));
        assert_eq!(aging(m, Some(d(2024, 7, 15)), today), Some(AgingBucket::Current));
        assert_eq!(aging(m, Some(d(2024, 6, 29)), today), Some(AgingBucket::Days1To30));
        assert_eq!(aging(m, Some(d(2024, 5, 31)), today), Some(AgingBucket::Days1To30));
        assert_eq!(aging(m, Some(d(2024, 5, 30)), today), Some(AgingBucket::Days31To60));
        assert_eq!(aging(m, Some(d(2024, 4, 1)), today), Some(AgingBucket::Days61To90));
        assert_eq!(aging(m, Some(d(2024, 3, 1)), today), Some(AgingBucket::Over90));
        assert_eq!(aging(m, None, today), Some(AgingBucket::Current));
        assert_eq!(aging(Money::ZERO, Some(d(2020, 1, 1)), today), None);
    }

    #[test]
    fn report_sums_by_bucket() {
        let today = d(2024, 6, 30);
        let mut report = AgingReport::default();
        report.add(Money::new(100), None, today);
        report.add(Money::new(50), Some(d(2024, 6, 1)), today);
        report.add(Money::new(25), Some(d(2023, 1, 1)), today);
        report.add(Money::ZERO, Some(d(2023, 1, 1)), today);

        assert_eq!(report.current, Money::new(100));
        assert_eq!(report.days_1_30, Money::new(50));
        assert_eq!(report.over_90, Money::new(25));
        assert_eq!(report.total, Money::new(175));

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["1-30"], 50);
    }
}
