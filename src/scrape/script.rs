use crate::error::AppError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static SET_ITEM: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"setItem\(\s*['"]([^'"]+)['"]\s*,\s*['"](.*?)['"]\s*\)"#));

pub const SIGNIN_TOKEN_KEY: &str = "signinAT";
pub const BASE_URI_KEY: &str = "baseUri";
pub const INITIAL_STATE_KEY: &str = "initialState";

/// `setItem(key, value)` literals in source order; a repeated key keeps the
/// last value, the way `localStorage` would end up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptLiterals {
    pairs: Vec<(String, String)>,
}

impl ScriptLiterals {
    fn set(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(existing, _)| existing == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, key: &str) -> Result<&str, AppError> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::ProtocolShapeChanged(format!("script literal '{key}' missing")))
    }

    pub fn json(&self, key: &str) -> Result<Value, AppError> {
        parse_json_literal(key, self.require(key)?)
    }

    pub fn trailing_json(&self) -> Result<Value, AppError> {
        let (key, raw) = self
            .pairs
            .last()
            .ok_or_else(|| AppError::ProtocolShapeChanged("no script literals".into()))?;
        parse_json_literal(key, raw)
    }
}

fn parse_json_literal(key: &str, raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(raw)
        .or_else(|_| serde_json::from_str(&raw.replace("\\\"", "\"").replace("\\/", "/")))
        .map_err(|e| AppError::ProtocolShapeChanged(format!("script literal '{key}' is not JSON: {e}")))
}

pub fn extract_literals(text: &str, expected: usize) -> Result<ScriptLiterals, AppError> {
    let pattern = SET_ITEM
        .as_ref()
        .map_err(|e| AppError::ProtocolShapeChanged(format!("setItem pattern: {e}")))?;

    let mut literals = ScriptLiterals::default();
    let mut found = 0usize;
    for caps in pattern.captures_iter(text) {
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            literals.set(key.as_str(), value.as_str());
            found += 1;
        }
    }

    if found < expected {
        return Err(AppError::ProtocolShapeChanged(format!(
            "expected at least {expected} setItem literals, found {found}"
        )));
    }
    Ok(literals)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignInLiterals {
    pub signin_token: String,
    pub base_uri: String,
    pub initial_state: Value,
}

impl SignInLiterals {
    pub const EXPECTED_LITERALS: usize = 3;

    pub fn from_page(text: &str) -> Result<Self, AppError> {
        let literals = extract_literals(text, Self::EXPECTED_LITERALS)?;
        let initial_state = match literals.get(INITIAL_STATE_KEY) {
            Some(_) => literals.json(INITIAL_STATE_KEY)?,
            None => literals.trailing_json()?,
        };
        Ok(Self {
            signin_token: literals.require(SIGNIN_TOKEN_KEY)?.to_string(),
            base_uri: literals.require(BASE_URI_KEY)?.to_string(),
            initial_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_pairs_in_order_and_decodes_trailing_json() {
        let body = r#"<script>setItem('k1','v1'); setItem('k2','v2'); setItem('k3','v3'); setItem('k4','{"x":1}')</script>"#;
        let literals = extract_literals(body, 4).expect("four literals");
        let keys: Vec<&str> = literals.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3", "k4"]);
        assert_eq!(literals.get("k2"), Some("v2"));
        assert_eq!(literals.trailing_json().expect("json"), json!({"x": 1}));
        assert_eq!(literals.json("k4").expect("json"), json!({"x": 1}));
    }

    #[test]
    fn accepts_either_quote_style_and_spacing() {
        let body = r#"localStorage.setItem("signinAT", "tok-123");
            localStorage.setItem( 'baseUri' , "https://idcs.example/" );"#;
        let literals = extract_literals(body, 2).expect("two literals");
        assert_eq!(literals.get("signinAT"), Some("tok-123"));
        assert_eq!(literals.get("baseUri"), Some("https://idcs.example/"));
    }

    #[test]
    fn last_write_wins() {
        let body = "setItem('a','1'); setItem('b','2'); setItem('a','3');";
        let literals = extract_literals(body, 3).expect("literals");
        assert_eq!(literals.len(), 2);
        assert_eq!(literals.get("a"), Some("3"));
        assert_eq!(literals.pairs()[0].0, "a");
    }

    #[test]
    fn call_with_variable_value_does_not_swallow_the_next_literal() {
        let body = "localStorage.setItem('clientId', cid); localStorage.setItem('signinAT','tok');";
        let literals = extract_literals(body, 1).expect("one literal");
        assert_eq!(literals.len(), 1);
        assert_eq!(literals.get("signinAT"), Some("tok"));
        assert_eq!(literals.get("clientId"), None);
    }

    #[test]
    fn too_few_literals_signal_a_shape_change() {
        let err = extract_literals("setItem('only','one');", 3).expect_err("should fail");
        assert!(matches!(err, AppError::ProtocolShapeChanged(msg) if msg.contains("found 1")));
    }

    #[test]
    fn sign_in_literals_from_identity_page() {
        let page = r#"<script>
            localStorage.setItem('clientId', 'abc');
            localStorage.setItem('signinAT', 'eyJ.signin');
            localStorage.setItem('baseUri', 'https://idcs.example.com/');
            localStorage.setItem('initialState', '{"requestState":"rs","nextOp":["credSubmit"]}');
        </script>"#;
        let literals = SignInLiterals::from_page(page).expect("literals");
        assert_eq!(literals.signin_token, "eyJ.signin");
        assert_eq!(literals.base_uri, "https://idcs.example.com/");
        assert_eq!(literals.initial_state["requestState"], "rs");
    }

    #[test]
    fn initial_state_falls_back_to_trailing_blob() {
        let page = r#"setItem('signinAT','s'); setItem('baseUri','https://b.example'); setItem('state_blob','{"x":1}');"#;
        let literals = SignInLiterals::from_page(page).expect("literals");
        assert_eq!(literals.initial_state, json!({"x": 1}));
    }

    #[test]
    fn missing_sign_in_token_is_a_shape_change() {
        let page = r#"setItem('a','1'); setItem('baseUri','https://b.example'); setItem('initialState','{}');"#;
        let err = SignInLiterals::from_page(page).expect_err("missing signinAT");
        assert!(matches!(err, AppError::ProtocolShapeChanged(msg) if msg.contains("signinAT")));
    }

    #[test]
    fn unparseable_initial_state_is_a_shape_change() {
        let page = r#"setItem('signinAT','s'); setItem('baseUri','u'); setItem('initialState','not json');"#;
        assert!(matches!(
            SignInLiterals::from_page(page),
            Err(AppError::ProtocolShapeChanged(_))
        ));
    }
}
