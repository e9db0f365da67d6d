use crate::auth::pipeline::SsoEndpoints;
use crate::auth::token::{TokenBundle, TokenManager};
use crate::error::AppError;
use crate::transport::{HttpTransport, RequestBody};
use serde_json::Value;
use std::sync::Arc;

pub struct PortalApi {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenManager>,
    endpoints: SsoEndpoints,
}

impl PortalApi {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenManager>,
        endpoints: SsoEndpoints,
    ) -> Self {
        Self {
            transport,
            tokens,
            endpoints,
        }
    }

    async fn post_with(&self, url: &str, token: &TokenBundle, payload: Value) -> Result<Value, AppError> {
        let bearer = format!("Bearer {}", token.access_token);
        let response = self
            .transport
            .post(
                url,
                RequestBody::Json(payload),
                &[
                    ("Content-Type", "application/json"),
                    ("Authorization", bearer.as_str()),
                ],
                false,
            )
            .await?;
        response.json()
    }

    /// POSTs the payload built from the current token. An expired token is
    /// renewed first; a 401/403 answer triggers exactly one forced re-login
    /// and retry.
    pub async fn post_json<F>(&self, path: &str, build: F) -> Result<Value, AppError>
    where
        F: Fn(&TokenBundle) -> Value + Send + Sync,
    {
        let url = self.endpoints.api_url(path)?;
        let token = self.tokens.valid_token().await?;

        match self.post_with(&url, &token, build(&token)).await {
            Err(err) if err.is_unauthorized() => {
                tracing::info!(path, "request rejected as unauthorized; logging in again");
                let token = self.tokens.relogin().await?;
                self.post_with(&url, &token, build(&token)).await
            }
            other => other,
        }
    }
}

pub(crate) fn field_array<'a>(body: &'a Value, key: &str, context: &str) -> Result<&'a Vec<Value>, AppError> {
    body.get(key).and_then(Value::as_array).ok_or_else(|| {
        AppError::ProtocolShapeChanged(format!("{context}: response has no '{key}' list"))
    })
}

pub(crate) fn required_string(item: &Value, key: &str, context: &str) -> Result<String, AppError> {
    Some(field_string(item, key))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::ProtocolShapeChanged(format!("{context}: row has no '{key}'")))
}

pub(crate) fn field_string(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_string_accepts_strings_and_numbers() {
        let row = json!({ "accountNumber": "A-1", "personId": 77 });
        assert_eq!(required_string(&row, "accountNumber", "holders").expect("present"), "A-1");
        assert_eq!(required_string(&row, "personId", "holders").expect("present"), "77");
    }

    #[test]
    fn required_string_rejects_missing_and_blank_fields() {
        let row = json!({ "acctNo": "A-1", "serviceId": "" });
        for key in ["accountNumber", "serviceId"] {
            let err = required_string(&row, key, "holders").expect_err("absent");
            assert!(matches!(err, AppError::ProtocolShapeChanged(msg) if msg == format!("holders: row has no '{key}'")));
        }
    }

    #[test]
    fn optional_fields_default_to_empty() {
        assert_eq!(field_string(&json!({}), "serviceAddress"), "");
    }
}
