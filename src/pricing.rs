use crate::models::{MeterUsage, Rates};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Seasonal first-block sizes. Defaults follow Seattle City Light's
/// residential schedule (10 kWh/day April through September, 16 kWh/day otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockSchedule {
    pub summer_start_month: u32,
    pub summer_end_month: u32,
    pub summer_block_kwh: f64,
    pub winter_block_kwh: f64,
}

impl Default for BlockSchedule {
    fn default() -> Self {
        Self {
            summer_start_month: 4,
            summer_end_month: 9,
            summer_block_kwh: 10.0,
            winter_block_kwh: 16.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Summer,
    Winter,
}

impl BlockSchedule {
    pub fn season(&self, month: u32) -> Season {
        if (self.summer_start_month..=self.summer_end_month).contains(&month) {
            Season::Summer
        } else {
            Season::Winter
        }
    }

    pub fn block_size(&self, month: u32) -> f64 {
        match self.season(month) {
            Season::Summer => self.summer_block_kwh,
            Season::Winter => self.winter_block_kwh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub first_block_kwh: f64,
    pub second_block_kwh: f64,
    pub total: f64,
}

pub fn breakdown(usage: &MeterUsage, rates: &Rates, schedule: &BlockSchedule) -> CostBreakdown {
    let block = schedule.block_size(usage.date.month());
    let first_block_kwh = usage.usage_kwh.min(block);
    let second_block_kwh = (usage.usage_kwh - block).max(0.0);
    let total = rates.base
        + rates.first_block * first_block_kwh
        + rates.second_block * second_block_kwh
        + rates.misc_per_kwh * usage.usage_kwh;
    CostBreakdown {
        first_block_kwh,
        second_block_kwh,
        total,
    }
}

pub fn apply_cost(mut usage: MeterUsage, rates: Option<&Rates>, schedule: &BlockSchedule) -> MeterUsage {
    usage.cost = match rates {
        Some(rates) => {
            let parts = breakdown(&usage, rates, schedule);
            tracing::debug!(
                date = %usage.date,
                kwh = usage.usage_kwh,
                first_block_kwh = parts.first_block_kwh,
                second_block_kwh = parts.second_block_kwh,
                cost = parts.total,
                "priced daily usage"
            );
            parts.total
        }
        None => 0.0,
    };
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn usage(month: u32, kwh: f64) -> MeterUsage {
        MeterUsage::new(
            NaiveDate::from_ymd_opt(2024, month, 15).expect("valid date"),
            kwh,
        )
    }

    fn rates() -> Rates {
        Rates {
            base: 0.2301,
            first_block: 0.1132,
            second_block: 0.1307,
            misc_per_kwh: 0.01,
        }
    }

    #[test]
    fn zero_usage_costs_only_the_base_charge() {
        let schedule = BlockSchedule::default();
        for month in 1..=12 {
            let priced = apply_cost(usage(month, 0.0), Some(&rates()), &schedule);
            assert_eq!(priced.cost, rates().base);
        }
    }

    #[test]
    fn winter_block_is_sixteen_kwh() {
        let schedule = BlockSchedule::default();
        for month in [1, 2, 3, 10, 11, 12] {
            assert_eq!(schedule.season(month), Season::Winter);
            assert_eq!(breakdown(&usage(month, 16.0), &rates(), &schedule).second_block_kwh, 0.0);
            let parts = breakdown(&usage(month, 20.0), &rates(), &schedule);
            assert_eq!(parts.first_block_kwh, 16.0);
            assert_eq!(parts.second_block_kwh, 4.0);
        }
    }

    #[test]
    fn summer_block_is_ten_kwh() {
        let schedule = BlockSchedule::default();
        for month in 4..=9 {
            assert_eq!(schedule.season(month), Season::Summer);
            assert_eq!(breakdown(&usage(month, 10.0), &rates(), &schedule).second_block_kwh, 0.0);
            assert_eq!(breakdown(&usage(month, 15.0), &rates(), &schedule).second_block_kwh, 5.0);
        }
    }

    #[test]
    fn total_combines_all_four_coefficients() {
        let priced = apply_cost(usage(7, 15.0), Some(&rates()), &BlockSchedule::default());
        let expected = 0.2301 + 0.1132 * 10.0 + 0.1307 * 5.0 + 0.01 * 15.0;
        assert!((priced.cost - expected).abs() < 1e-12);
    }

    #[test]
    fn pricing_twice_gives_the_same_cost() {
        let schedule = BlockSchedule::default();
        let once = apply_cost(usage(2, 23.5), Some(&rates()), &schedule);
        let twice = apply_cost(once.clone(), Some(&rates()), &schedule);
        assert_eq!(once.cost, twice.cost);
    }

    #[test]
    fn missing_rates_cost_nothing() {
        let priced = apply_cost(usage(2, 42.0), None, &BlockSchedule::default());
        assert_eq!(priced.cost, 0.0);
    }

    #[test]
    fn schedule_can_be_overridden() {
        let schedule = BlockSchedule {
            summer_start_month: 6,
            summer_end_month: 8,
            summer_block_kwh: 12.0,
            winter_block_kwh: 20.0,
        };
        assert_eq!(schedule.season(4), Season::Winter);
        assert_eq!(breakdown(&usage(7, 15.0), &rates(), &schedule).second_block_kwh, 3.0);
        assert_eq!(breakdown(&usage(4, 25.0), &rates(), &schedule).second_block_kwh, 5.0);
    }
}
