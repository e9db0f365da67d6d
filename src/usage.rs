use crate::api::{field_array, PortalApi};
use crate::error::AppError;
use crate::models::{Meter, MeterUsage, Rates};
use crate::pricing::{apply_cost, BlockSchedule};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value};
use std::sync::Arc;

const REQUEST_DATE_FORMAT: &str = "%m/%d/%Y";
const CHARGE_DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_history_entry(entry: &Value) -> Result<MeterUsage, AppError> {
    let raw_date = entry
        .get("chargeDateRaw")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::ProtocolShapeChanged("usage entry has no chargeDateRaw".into()))?;
    let date = NaiveDate::parse_from_str(raw_date, CHARGE_DATE_FORMAT).map_err(|e| {
        AppError::ProtocolShapeChanged(format!("usage date '{raw_date}' not {CHARGE_DATE_FORMAT}: {e}"))
    })?;
    let usage_kwh = match entry.get("billedConsumption") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        AppError::ProtocolShapeChanged(format!("usage entry for {raw_date} has no numeric billedConsumption"))
    })?;
    Ok(MeterUsage::new(date, usage_kwh))
}

pub fn latest_window(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    (yesterday.and_time(NaiveTime::MIN), today.and_time(end_of_day))
}

pub fn pick_latest(usage: &[MeterUsage], start: NaiveDateTime, end: NaiveDateTime) -> Option<MeterUsage> {
    usage
        .iter()
        .filter(|u| u.usage_kwh != 0.0)
        .filter(|u| (start..=end).contains(&u.date.and_time(NaiveTime::MIN)))
        .last()
        .cloned()
}

pub struct UsageFetcher {
    api: Arc<PortalApi>,
    rates: Option<Rates>,
    schedule: BlockSchedule,
}

impl UsageFetcher {
    pub fn new(api: Arc<PortalApi>, rates: Option<Rates>, schedule: BlockSchedule) -> Self {
        Self {
            api,
            rates,
            schedule,
        }
    }

    pub async fn daily_usage(
        &self,
        meter: &Meter,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MeterUsage>, AppError> {
        tracing::info!(account = %meter.account.account_number, meter = %meter.id, "looking up daily usage");
        let body = self
            .api
            .post_json("rest/usage/month", |token| {
                json!({
                    "customerId": token.customer_id,
                    "accountContext": {
                        "accountNumber": meter.account.account_number,
                        "serviceId": meter.bill.service_id,
                    },
                    "startDate": start.format(REQUEST_DATE_FORMAT).to_string(),
                    "endDate": end.format(REQUEST_DATE_FORMAT).to_string(),
                    "port": meter.id,
                })
            })
            .await?;

        let mut usage = Vec::new();
        for entry in field_array(&body, "history", "usage history")? {
            let reading = parse_history_entry(entry)?;
            if (start..=end).contains(&reading.date.and_time(NaiveTime::MIN)) {
                usage.push(apply_cost(reading, self.rates.as_ref(), &self.schedule));
            }
        }
        Ok(usage)
    }

    /// Yesterday's reading for `meter` relative to `today`; `None` when the
    /// provider has nothing non-zero yet.
    pub async fn latest_usage(
        &self,
        meter: &Meter,
        today: NaiveDate,
    ) -> Result<Option<MeterUsage>, AppError> {
        let (start, end) = latest_window(today);
        let usage = self.daily_usage(meter, start, end).await?;
        Ok(pick_latest(&usage, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_string_and_numeric_consumption() {
        let a = parse_history_entry(&json!({"chargeDateRaw": "2024-03-01", "billedConsumption": "12.5"}))
            .expect("entry");
        assert_eq!(a.date, day(2024, 3, 1));
        assert_eq!(a.usage_kwh, 12.5);
        assert_eq!(a.cost, 0.0);

        let b = parse_history_entry(&json!({"chargeDateRaw": "2024-03-02", "billedConsumption": 7}))
            .expect("entry");
        assert_eq!(b.usage_kwh, 7.0);
    }

    #[test]
    fn bad_history_entries_signal_shape_change() {
        for entry in [
            json!({"billedConsumption": "1"}),
            json!({"chargeDateRaw": "03/01/2024", "billedConsumption": "1"}),
            json!({"chargeDateRaw": "2024-03-01", "billedConsumption": "n/a"}),
        ] {
            assert!(matches!(
                parse_history_entry(&entry),
                Err(AppError::ProtocolShapeChanged(_))
            ));
        }
    }

    #[test]
    fn latest_window_spans_yesterday_and_today() {
        let (start, end) = latest_window(day(2024, 3, 1));
        assert_eq!(start.to_string(), "2024-02-29 00:00:00");
        assert_eq!(end.to_string(), "2024-03-01 23:59:59.999");
    }

    #[test]
    fn pick_latest_skips_zero_and_out_of_window() {
        let today = day(2024, 6, 10);
        let (start, end) = latest_window(today);
        let usage = vec![
            MeterUsage::new(day(2024, 6, 8), 9.0),
            MeterUsage::new(day(2024, 6, 9), 5.0),
            MeterUsage::new(day(2024, 6, 10), 0.0),
        ];
        let latest = pick_latest(&usage, start, end).expect("yesterday");
        assert_eq!(latest.date, day(2024, 6, 9));
        assert_eq!(latest.usage_kwh, 5.0);

        assert!(pick_latest(&usage[2..], start, end).is_none());
        assert!(pick_latest(&usage[..1], start, end).is_none());
    }

    #[test]
    fn pick_latest_takes_last_qualifying_reading() {
        let (start, end) = latest_window(day(2024, 6, 10));
        let usage = vec![
            MeterUsage::new(day(2024, 6, 9), 5.0),
            MeterUsage::new(day(2024, 6, 10), 2.0),
        ];
        assert_eq!(pick_latest(&usage, start, end).map(|u| u.usage_kwh), Some(2.0));
    }
}
