use crate::api::PortalApi;
use crate::auth::pipeline::{AuthenticationPipeline, SsoEndpoints, DEFAULT_BASE_DOMAIN};
use crate::auth::token::{TokenBundle, TokenManager};
use crate::discovery::AccountDiscovery;
use crate::error::AppError;
use crate::models::{Meter, MeterUsage, Rates};
use crate::pricing::BlockSchedule;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::usage::UsageFetcher;
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_AUTHENTICATION_URL: &str = "https://login.seattle.gov/authenticate";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub base_domain: String,
    pub authentication_url: Option<String>,
    pub rates: Option<Rates>,
    pub schedule: BlockSchedule,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            authentication_url: Some(DEFAULT_AUTHENTICATION_URL.to_string()),
            rates: None,
            schedule: BlockSchedule::default(),
        }
    }
}

impl ClientOptions {
    pub fn endpoints(&self) -> SsoEndpoints {
        SsoEndpoints::new(self.base_domain.clone(), self.authentication_url.clone())
    }
}

pub struct UtilityClient {
    tokens: Arc<TokenManager>,
    discovery: AccountDiscovery,
    usage: UsageFetcher,
}

impl UtilityClient {
    pub fn new(options: ClientOptions) -> Result<Self, AppError> {
        Ok(Self::with_transport(options, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(options: ClientOptions, transport: Arc<dyn HttpTransport>) -> Self {
        let endpoints = options.endpoints();
        let pipeline = AuthenticationPipeline::new(transport.clone(), endpoints.clone());
        let tokens = Arc::new(TokenManager::new(pipeline));
        let api = Arc::new(PortalApi::new(transport, tokens.clone(), endpoints));
        Self {
            tokens,
            discovery: AccountDiscovery::new(api.clone()),
            usage: UsageFetcher::new(api, options.rates, options.schedule),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), AppError> {
        self.tokens.login(username, password).await
    }

    pub fn is_token_expired(&self) -> bool {
        self.tokens.is_expired()
    }

    pub fn token(&self) -> Option<TokenBundle> {
        self.tokens.bundle()
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn get_meters(&self) -> Result<BTreeMap<String, Meter>, AppError> {
        self.discovery.meters().await
    }

    pub async fn daily_usage(
        &self,
        meter: &Meter,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MeterUsage>, AppError> {
        self.usage.daily_usage(meter, start, end).await
    }

    pub async fn get_latest_usage(&self) -> Result<BTreeMap<String, Option<MeterUsage>>, AppError> {
        self.get_latest_usage_on(Local::now().date_naive()).await
    }

    pub async fn get_latest_usage_on(
        &self,
        today: NaiveDate,
    ) -> Result<BTreeMap<String, Option<MeterUsage>>, AppError> {
        let meters = self.get_meters().await?;
        let mut latest = BTreeMap::new();
        for (id, meter) in meters {
            let usage = self.usage.latest_usage(&meter, today).await?;
            if usage.is_none() {
                tracing::debug!(meter = %id, "no non-zero reading for yesterday yet");
            }
            latest.insert(id, usage);
        }
        Ok(latest)
    }
}
