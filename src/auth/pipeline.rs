//! The SSO login flow, one method per hop.
//!
//! The provider fronts its portal with an Oracle Identity Cloud sign-in. There
//! is no published contract: each hop replays what a browser does and hands an
//! opaque value (redirect, cookie, hidden form, script literal) to the next.
//! Every hop is `pub` so captured fixtures can exercise it on its own; `run`
//! chains them and folds any failure into `AppError::LoginFailed`.

use crate::auth::token::{scalar_string, TokenBundle};
use crate::error::AppError;
use crate::models::Credentials;
use crate::scrape::script::SignInLiterals;
use crate::scrape::{extract_form, HtmlForm};
use crate::transport::{HttpResponse, HttpTransport, RequestBody, ACCEPT_HTML};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use url::Url;

pub const DEFAULT_BASE_DOMAIN: &str = "myutilities.seattle.gov";
const TOKEN_CLIENT_ID: &str = "webClientIdPassword";
const TOKEN_CLIENT_SECRET: &str = "secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    OracleLocation,
    IdentityRedirect,
    IdentityForm,
    SignInLiterals,
    Authenticate,
    SessionForm,
    SamlForm,
    UserToken,
    TokenExchange,
}

impl LoginStep {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginStep::OracleLocation => "oracle_location",
            LoginStep::IdentityRedirect => "identity_redirect",
            LoginStep::IdentityForm => "identity_form",
            LoginStep::SignInLiterals => "sign_in_literals",
            LoginStep::Authenticate => "authenticate",
            LoginStep::SessionForm => "session_form",
            LoginStep::SamlForm => "saml_form",
            LoginStep::UserToken => "user_token",
            LoginStep::TokenExchange => "token_exchange",
        }
    }
}

impl fmt::Display for LoginStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoEndpoints {
    pub base_domain: String,
    pub authentication_url: Option<String>,
}

impl Default for SsoEndpoints {
    fn default() -> Self {
        Self {
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            authentication_url: None,
        }
    }
}

impl SsoEndpoints {
    pub fn new(base_domain: impl Into<String>, authentication_url: Option<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
            authentication_url,
        }
    }

    pub fn portal_origin(&self) -> String {
        format!("https://{}", self.base_domain)
    }

    pub fn sso_login_url(&self) -> String {
        format!("{}/rest/auth/ssologin", self.portal_origin())
    }

    pub fn authentication_url(&self) -> String {
        self.authentication_url
            .clone()
            .unwrap_or_else(|| format!("{}/authenticate", self.portal_origin()))
    }

    pub fn token_url(&self) -> String {
        format!("{}/rest/auth/token", self.portal_origin())
    }

    pub fn api_url(&self, path: &str) -> Result<String, AppError> {
        let origin = Url::parse(&format!("{}/", self.portal_origin()))
            .map_err(|e| AppError::Config(format!("invalid base domain '{}': {e}", self.base_domain)))?;
        origin
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| AppError::Config(format!("invalid API path '{path}': {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRedirect {
    pub identity_url: String,
    pub cookie: Option<String>,
}

impl IdentityRedirect {
    pub fn cookie_pair(&self) -> Option<&str> {
        self.cookie
            .as_deref()
            .and_then(|raw| raw.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl PendingForm {
    fn from_page(step: LoginStep, page_url: &str, form: HtmlForm) -> Result<Self, AppError> {
        let action = resolve(page_url, form.require_action()?)?;
        tracing::debug!(step = %step, action = %action, fields = form.fields.len(), "scraped form");
        Ok(Self {
            action,
            fields: form.fields.into_pairs(),
        })
    }
}

fn resolve(base: &str, target: &str) -> Result<String, AppError> {
    if let Ok(absolute) = Url::parse(target) {
        return Ok(absolute.to_string());
    }
    let base = Url::parse(base)
        .map_err(|e| AppError::UnexpectedResponse(format!("cannot resolve against '{base}': {e}")))?;
    base.join(target)
        .map(String::from)
        .map_err(|e| AppError::UnexpectedResponse(format!("bad redirect target '{target}': {e}")))
}

fn require_location(step: LoginStep, response: &HttpResponse) -> Result<String, AppError> {
    let location = response
        .location()
        .filter(|loc| !loc.trim().is_empty())
        .ok_or_else(|| AppError::UnexpectedResponse(format!("{step}: no Location header")))?;
    resolve(&response.url, location)
}

pub struct AuthenticationPipeline {
    transport: Arc<dyn HttpTransport>,
    endpoints: SsoEndpoints,
}

impl AuthenticationPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: SsoEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub async fn oracle_location(&self) -> Result<String, AppError> {
        let step = LoginStep::OracleLocation;
        tracing::debug!(step = %step, "requesting SSO entry");
        let response = self
            .transport
            .get(&self.endpoints.sso_login_url(), &[("Accept", ACCEPT_HTML)], false)
            .await?;
        require_location(step, &response)
    }

    pub async fn identity_redirect(&self, oracle_location: &str) -> Result<IdentityRedirect, AppError> {
        let step = LoginStep::IdentityRedirect;
        tracing::debug!(step = %step, "requesting Oracle session cookie");
        let response = self
            .transport
            .get(oracle_location, &[("Accept", ACCEPT_HTML)], false)
            .await?;
        let identity_url = require_location(step, &response)?;
        let cookie = response.set_cookie().map(str::to_string);
        tracing::debug!(step = %step, has_cookie = cookie.is_some(), "identity redirect received");
        Ok(IdentityRedirect {
            identity_url,
            cookie,
        })
    }

    /// Hop 3: the identity page carries one hidden form to post back. The
    /// Oracle cookie from hop 2 is presented explicitly.
    pub async fn identity_form(&self, redirect: &IdentityRedirect) -> Result<PendingForm, AppError> {
        let step = LoginStep::IdentityForm;
        tracing::debug!(step = %step, "requesting identity page");
        let mut headers = vec![("Accept", ACCEPT_HTML)];
        if let Some(pair) = redirect.cookie_pair() {
            headers.push(("Cookie", pair));
        }
        let response = self
            .transport
            .get(&redirect.identity_url, &headers, false)
            .await?;
        PendingForm::from_page(step, &redirect.identity_url, extract_form(&response.body)?)
    }

    pub async fn sign_in_literals(&self, form: &PendingForm) -> Result<SignInLiterals, AppError> {
        let step = LoginStep::SignInLiterals;
        tracing::debug!(step = %step, "submitting identity form");
        let response = self.submit(form).await?;
        let literals = SignInLiterals::from_page(&response.body)?;
        tracing::debug!(step = %step, base_uri = %literals.base_uri, "sign-in literals extracted");
        Ok(literals)
    }

    /// Hop 5: credentials go to the authenticate endpoint as JSON; the answer
    /// holds an intermediate `authnToken`.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        literals: &SignInLiterals,
    ) -> Result<String, AppError> {
        let step = LoginStep::Authenticate;
        tracing::debug!(step = %step, "posting credentials");
        let body = json!({
            "credentials": {
                "password": credentials.password,
                "username": credentials.username,
            },
            "signinAT": literals.signin_token,
            "initialState": literals.initial_state,
        });
        let response = self
            .transport
            .post(
                &self.endpoints.authentication_url(),
                RequestBody::Json(body),
                &[("Content-Type", "application/json")],
                false,
            )
            .await?;
        let payload: Value = response
            .json()
            .map_err(|e| AppError::ProtocolShapeChanged(format!("{step}: response is not JSON: {e}")))?;
        scalar_string(payload.get("authnToken"))
            .ok_or_else(|| AppError::ProtocolShapeChanged(format!("{step}: no authnToken in response")))
    }

    pub async fn session_form(&self, base_uri: &str, authn_token: &str) -> Result<PendingForm, AppError> {
        let step = LoginStep::SessionForm;
        let session_url = format!("{}/sso/v1/sdk/session", base_uri.trim_end_matches('/'));
        tracing::debug!(step = %step, url = %session_url, "opening SSO session");
        let response = self
            .transport
            .post(
                &session_url,
                RequestBody::Form(vec![("authnToken".into(), authn_token.to_string())]),
                &[],
                false,
            )
            .await?;
        PendingForm::from_page(step, &session_url, extract_form(&response.body)?)
    }

    pub async fn saml_form(&self, session_form: &PendingForm) -> Result<PendingForm, AppError> {
        let step = LoginStep::SamlForm;
        tracing::debug!(step = %step, "submitting session form");
        let response = self.submit(session_form).await?;
        PendingForm::from_page(step, &session_form.action, extract_form(&response.body)?)
    }

    /// Hop 8: posting the SAML form redirects to a URL whose last segment is
    /// a one-time user token.
    pub async fn user_token(&self, saml_form: &PendingForm) -> Result<String, AppError> {
        let step = LoginStep::UserToken;
        tracing::debug!(step = %step, "submitting SAML form");
        let response = self.submit(saml_form).await?;
        let location = require_location(step, &response)?;
        location
            .rsplit('/')
            .next()
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::UnexpectedResponse(format!("{step}: redirect carries no user token"))
            })
    }

    pub async fn exchange_token(&self, user_token: &str) -> Result<TokenBundle, AppError> {
        let step = LoginStep::TokenExchange;
        tracing::debug!(step = %step, "exchanging user token");
        let basic = format!(
            "Basic {}",
            BASE64.encode(format!("{TOKEN_CLIENT_ID}:{TOKEN_CLIENT_SECRET}"))
        );
        let response = self
            .transport
            .post(
                &self.endpoints.token_url(),
                RequestBody::Form(vec![
                    ("usertoken".into(), user_token.to_string()),
                    ("grant_type".into(), "authorization_code".into()),
                    ("logintype".into(), "sso".into()),
                ]),
                &[("Authorization", basic.as_str())],
                false,
            )
            .await?;
        let payload: Value = response
            .json()
            .map_err(|e| AppError::ProtocolShapeChanged(format!("{step}: response is not JSON: {e}")))?;
        TokenBundle::from_response(&payload, Utc::now())
    }

    async fn submit(&self, form: &PendingForm) -> Result<HttpResponse, AppError> {
        self.transport
            .post(&form.action, RequestBody::Form(form.fields.clone()), &[], false)
            .await
    }

    async fn run_steps(&self, credentials: &Credentials) -> Result<TokenBundle, AppError> {
        let oracle_location = self.oracle_location().await?;
        let redirect = self.identity_redirect(&oracle_location).await?;
        let identity_form = self.identity_form(&redirect).await?;
        let literals = self.sign_in_literals(&identity_form).await?;
        let authn_token = self.authenticate(credentials, &literals).await?;
        let session_form = self.session_form(&literals.base_uri, &authn_token).await?;
        let saml_form = self.saml_form(&session_form).await?;
        let user_token = self.user_token(&saml_form).await?;
        self.exchange_token(&user_token).await
    }

    /// Runs every hop in order. Any failure aborts the flow as `LoginFailed`
    /// carrying the original cause.
    pub async fn run(&self, credentials: &Credentials) -> Result<TokenBundle, AppError> {
        self.run_steps(credentials)
            .await
            .map_err(AppError::login_failed)
    }
}
