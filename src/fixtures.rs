//! Captured-shape responses for the SSO flow and the portal REST API.
//!
//! Pair these with [`crate::transport::ScriptedTransport`] to replay a login
//! or a discovery walk without the network. Hostnames are placeholders; the
//! page and JSON shapes mirror what the provider serves.

use crate::transport::HttpResponse;
use serde_json::{json, Value};

pub const PORTAL_DOMAIN: &str = "portal.example";
pub const AUTHENTICATION_URL: &str = "https://login.example/authenticate";
pub const ORACLE_URL: &str = "https://idcs.example.com/oauth2/v1/authorize?client_id=portal";
pub const IDENTITY_URL: &str = "https://idcs.example.com/sso/v1/user/login";
pub const BASE_URI: &str = "https://idcs.example.com/";
pub const CUSTOMER_ID: &str = "C-1001";
pub const USERNAME: &str = "jane@example.com";

/// Number of requests a successful login makes.
pub const LOGIN_HOPS: usize = 9;

pub fn identity_page() -> String {
    r#"<html><body onload="document.forms[0].submit()">
        <form method="POST" action="/sso/v1/user/secure/login">
          <input type="hidden" name="signature" value="sig-1"/>
          <input type="hidden" name="state" value="st-1"/>
          <input type="submit" value="Continue"/>
        </form></body></html>"#
        .to_string()
}

pub fn sign_in_script() -> String {
    r#"<script>
        localStorage.setItem('clientId', 'portal');
        localStorage.setItem('signinAT', 'signin-at');
        localStorage.setItem('baseUri', 'https://idcs.example.com/');
        localStorage.setItem('initialState', '{"requestState":"rs-1","nextOp":["credSubmit"]}');
    </script>"#
        .to_string()
}

pub fn form_page(action: &str, name: &str, value: &str) -> String {
    format!(
        r#"<form method="post" action="{action}"><input type="hidden" name="{name}" value="{value}"></form>"#
    )
}

pub fn token_json(access_token: &str, created_ms: i64, expires_in: i64) -> String {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "created": created_ms,
        "user": { "customerId": CUSTOMER_ID, "userName": USERNAME },
    })
    .to_string()
}

/// Every hop of a successful login, in order.
pub fn login_responses(access_token: &str, created_ms: i64, expires_in: i64) -> Vec<HttpResponse> {
    vec![
        HttpResponse::new(302, "https://portal.example/rest/auth/ssologin", "")
            .with_header("Location", ORACLE_URL),
        HttpResponse::new(302, ORACLE_URL, "")
            .with_header("Location", IDENTITY_URL)
            .with_header("Set-Cookie", "ORA_OCIS=abc; Path=/; Secure"),
        HttpResponse::new(200, IDENTITY_URL, identity_page()),
        HttpResponse::new(
            200,
            "https://idcs.example.com/sso/v1/user/secure/login",
            sign_in_script(),
        ),
        HttpResponse::new(
            200,
            AUTHENTICATION_URL,
            r#"{"authnToken":"authn-1","status":"success"}"#,
        ),
        HttpResponse::new(
            200,
            "https://idcs.example.com/sso/v1/sdk/session",
            form_page(
                "https://idcs.example.com/sso/v1/user/login/finish",
                "loginCtx",
                "ctx-1",
            ),
        ),
        HttpResponse::new(
            200,
            "https://idcs.example.com/sso/v1/user/login/finish",
            form_page("https://portal.example/saml/acs", "SAMLResponse", "PHNhbWw+"),
        ),
        HttpResponse::new(302, "https://portal.example/saml/acs", "")
            .with_header("Location", "https://portal.example/#/login/usertoken/ut-77"),
        HttpResponse::new(
            200,
            "https://portal.example/rest/auth/token",
            token_json(access_token, created_ms, expires_in),
        ),
    ]
}

pub fn json_response(path: &str, body: Value) -> HttpResponse {
    HttpResponse::new(200, format!("https://{PORTAL_DOMAIN}/{path}"), body.to_string())
}

pub fn account_list(groups: &[&str]) -> HttpResponse {
    let groups: Vec<Value> = groups.iter().map(|name| json!({ "name": name })).collect();
    json_response("rest/account/list", json!({ "accountGroups": groups }))
}

pub fn account_holders(accounts: &[(&str, &str, &str)]) -> HttpResponse {
    let rows: Vec<Value> = accounts
        .iter()
        .map(|(number, person, address)| {
            json!({
                "accountNumber": number,
                "personId": person,
                "serviceAddress": address,
                "currentBillDate": "2024-05-20",
            })
        })
        .collect();
    json_response("rest/account/list/some", json!({ "account": rows }))
}

pub fn bill_comparison(bills: &[(&str, &[&str])]) -> HttpResponse {
    let rows: Vec<Value> = bills
        .iter()
        .map(|(service_id, meters)| json!({ "serviceId": service_id, "meters": meters }))
        .collect();
    json_response("rest/billing/comparison", json!({ "billList": rows }))
}

pub fn usage_history(days: &[(&str, &str)]) -> HttpResponse {
    let rows: Vec<Value> = days
        .iter()
        .map(|(date, kwh)| json!({ "chargeDateRaw": date, "billedConsumption": kwh }))
        .collect();
    json_response("rest/usage/month", json!({ "history": rows }))
}

pub fn unauthorized(path: &str) -> HttpResponse {
    HttpResponse::new(401, format!("https://{PORTAL_DOMAIN}/{path}"), r#"{"error":"invalid_token"}"#)
}
