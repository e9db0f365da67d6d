use crate::api::{field_array, field_string, required_string, PortalApi};
use crate::error::AppError;
use crate::models::{Account, Bill, Meter};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct HolderAccount {
    pub account: Account,
    pub current_bill_date: Value,
}

pub struct AccountDiscovery {
    api: Arc<PortalApi>,
}

impl AccountDiscovery {
    pub fn new(api: Arc<PortalApi>) -> Self {
        Self { api }
    }

    pub async fn account_groups(&self) -> Result<Vec<String>, AppError> {
        tracing::info!("looking up account groups");
        let body = self
            .api
            .post_json("rest/account/list", |token| {
                json!({
                    "customerId": token.customer_id,
                    "csrId": token.username,
                })
            })
            .await?;
        field_array(&body, "accountGroups", "account list")?
            .iter()
            .map(|group| required_string(group, "name", "account list"))
            .collect()
    }

    /// Account holders for one company code. Only the first page is
    /// requested; customers with more holders than one page will not see the rest.
    pub async fn account_holders(&self, company_code: &str) -> Result<Vec<HolderAccount>, AppError> {
        tracing::debug!(company_code, "looking up account holders");
        let body = self
            .api
            .post_json("rest/account/list/some", |token| {
                json!({
                    "customerId": token.customer_id,
                    "companyCode": company_code,
                    "page": "1",
                    "account": [],
                    "sortColumn": "DUED",
                    "sortOrder": "DESC",
                })
            })
            .await?;
        field_array(&body, "account", "account holders")?
            .iter()
            .map(|row| -> Result<HolderAccount, AppError> {
                Ok(HolderAccount {
                    account: Account {
                        account_number: required_string(row, "accountNumber", "account holders")?,
                        person_id: required_string(row, "personId", "account holders")?,
                        service_address: field_string(row, "serviceAddress"),
                    },
                    current_bill_date: row.get("currentBillDate").cloned().unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    pub async fn bills(&self, company_code: &str, holder: &HolderAccount) -> Result<Vec<Bill>, AppError> {
        let account = &holder.account;
        tracing::debug!(account = %account.account_number, "looking up bills");
        let body = self
            .api
            .post_json("rest/billing/comparison", |token| {
                json!({
                    "customerId": token.customer_id,
                    "accountContext": {
                        "accountNumber": account.account_number,
                        "personId": account.person_id,
                        "companyCd": company_code,
                        "serviceAddress": account.service_address,
                    },
                    "csrId": token.username,
                    "type": "Consumption",
                    "currentBillDate": holder.current_bill_date,
                    "period": "3",
                })
            })
            .await?;
        field_array(&body, "billList", "bill comparison")?
            .iter()
            .map(|bill| -> Result<Bill, AppError> {
                let meters = bill
                    .get("meters")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| match id {
                                Value::String(s) => Some(s.clone()),
                                Value::Number(n) => Some(n.to_string()),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Bill {
                    service_id: required_string(bill, "serviceId", "bill comparison")?,
                    meters,
                })
            })
            .collect()
    }

    /// Every meter the customer can see, keyed by id. A meter listed on more
    /// than one bill keeps the account and bill it was first found on.
    pub async fn meters(&self) -> Result<BTreeMap<String, Meter>, AppError> {
        let mut meters = BTreeMap::new();
        for company_code in self.account_groups().await? {
            for holder in self.account_holders(&company_code).await? {
                for bill in self.bills(&company_code, &holder).await? {
                    for meter_id in &bill.meters {
                        if meters.contains_key(meter_id) {
                            tracing::debug!(meter = %meter_id, "meter already seen on an earlier bill");
                            continue;
                        }
                        tracing::debug!(meter = %meter_id, service = %bill.service_id, "found meter");
                        meters.insert(
                            meter_id.clone(),
                            Meter {
                                id: meter_id.clone(),
                                account: holder.account.clone(),
                                bill: bill.clone(),
                            },
                        );
                    }
                }
            }
        }
        tracing::info!(count = meters.len(), "meter discovery finished");
        Ok(meters)
    }
}
