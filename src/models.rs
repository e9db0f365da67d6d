use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub person_id: String,
    pub service_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub service_id: String,
    pub meters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub id: String,
    pub account: Account,
    pub bill: Bill,
}

/// One day of metered consumption. `cost` stays at zero until priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterUsage {
    pub date: NaiveDate,
    pub usage_kwh: f64,
    pub cost: f64,
}

impl MeterUsage {
    pub fn new(date: NaiveDate, usage_kwh: f64) -> Self {
        Self {
            date,
            usage_kwh,
            cost: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rates {
    #[serde(default)]
    pub base: f64,
    #[serde(default)]
    pub first_block: f64,
    #[serde(default)]
    pub second_block: f64,
    #[serde(default)]
    pub misc_per_kwh: f64,
}

impl Rates {
    pub fn coefficients(&self) -> [(&'static str, f64); 4] {
        [
            ("base", self.base),
            ("first_block", self.first_block),
            ("second_block", self.second_block),
            ("misc_per_kwh", self.misc_per_kwh),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
