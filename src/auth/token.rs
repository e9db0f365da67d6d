use crate::auth::pipeline::AuthenticationPipeline;
use crate::error::AppError;
use crate::models::Credentials;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::Value;
use std::sync::RwLock;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBundle {
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_in: TimeDelta,
    pub customer_id: String,
    pub username: String,
}

pub(crate) fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl TokenBundle {
    /// Builds a bundle from the token endpoint's JSON. `created` is epoch
    /// milliseconds; when the server omits it the receipt time is used.
    pub fn from_response(body: &Value, received_at: DateTime<Utc>) -> Result<Self, AppError> {
        let shape = |field: &str| AppError::ProtocolShapeChanged(format!("token response has no {field}"));

        let access_token = scalar_string(body.get("access_token")).ok_or_else(|| shape("access_token"))?;
        let user = body.get("user");
        let customer_id = scalar_string(user.and_then(|u| u.get("customerId")))
            .ok_or_else(|| shape("user.customerId"))?;
        let username = scalar_string(user.and_then(|u| u.get("userName")))
            .ok_or_else(|| shape("user.userName"))?;

        let created_at = body
            .get("created")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(received_at);
        let expires_in = match body.get("expires_in").and_then(Value::as_i64) {
            Some(secs) => TimeDelta::try_seconds(secs).ok_or_else(|| {
                AppError::ProtocolShapeChanged(format!("token response has out-of-range expires_in {secs}"))
            })?,
            None => TimeDelta::zero(),
        };
        if created_at.checked_add_signed(expires_in).is_none() {
            return Err(AppError::ProtocolShapeChanged(
                "token response expiry lies past the representable date range".into(),
            ));
        }

        Ok(Self {
            access_token,
            created_at,
            expires_in,
            customer_id,
            username,
        })
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(self.expires_in)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= self.expires_in
    }
}

pub struct TokenManager {
    pipeline: AuthenticationPipeline,
    credentials: RwLock<Option<Credentials>>,
    bundle: RwLock<Option<TokenBundle>>,
    login_gate: Mutex<()>,
}

impl TokenManager {
    pub fn new(pipeline: AuthenticationPipeline) -> Self {
        Self {
            pipeline,
            credentials: RwLock::new(None),
            bundle: RwLock::new(None),
            login_gate: Mutex::new(()),
        }
    }

    pub fn bundle(&self) -> Option<TokenBundle> {
        self.bundle.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.bundle()
            .map(|bundle| bundle.is_expired_at(now))
            .unwrap_or(true)
    }

    fn stored_credentials(&self) -> Option<Credentials> {
        self.credentials.read().ok().and_then(|guard| guard.clone())
    }

    fn replace(&self, bundle: TokenBundle, credentials: Credentials) {
        if let Ok(mut slot) = self.bundle.write() {
            *slot = Some(bundle);
        }
        if let Ok(mut slot) = self.credentials.write() {
            *slot = Some(credentials);
        }
    }

    async fn login_locked(&self, credentials: Credentials) -> Result<TokenBundle, AppError> {
        tracing::info!(username = %credentials.username, "logging in");
        match self.pipeline.run(&credentials).await {
            Ok(bundle) => {
                tracing::info!(expires_at = %bundle.expires_at(), "login succeeded");
                self.replace(bundle.clone(), credentials);
                Ok(bundle)
            }
            Err(err) => {
                tracing::warn!(error = %err, "login failed; keeping previous session");
                Err(err)
            }
        }
    }

    /// Runs the SSO flow and swaps in the new bundle. A failed login leaves
    /// the previous bundle and credentials in place.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AppError> {
        let _gate = self.login_gate.lock().await;
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.login_locked(credentials).await.map(|_| ())
    }

    pub async fn relogin(&self) -> Result<TokenBundle, AppError> {
        let _gate = self.login_gate.lock().await;
        let credentials = self
            .stored_credentials()
            .ok_or(AppError::AuthenticationRequired)?;
        self.login_locked(credentials).await
    }

    pub async fn valid_token(&self) -> Result<TokenBundle, AppError> {
        if let Some(bundle) = self.bundle().filter(|b| !b.is_expired_at(Utc::now())) {
            return Ok(bundle);
        }

        let _gate = self.login_gate.lock().await;
        // Another caller may have renewed while we waited on the gate.
        if let Some(bundle) = self.bundle().filter(|b| !b.is_expired_at(Utc::now())) {
            return Ok(bundle);
        }
        let credentials = self
            .stored_credentials()
            .ok_or(AppError::AuthenticationRequired)?;
        tracing::debug!("token expired; renewing before request");
        self.login_locked(credentials).await
    }
}
