use crate::error::AppError;
use scraper::{Html, Selector};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = FormFields::default();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlForm {
    pub action: Option<String>,
    pub fields: FormFields,
}

impl HtmlForm {
    pub fn require_action(&self) -> Result<&str, AppError> {
        self.action
            .as_deref()
            .filter(|action| !action.trim().is_empty())
            .ok_or_else(|| AppError::MalformedDocument("no <form action> in document".into()))
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::MalformedDocument(format!("selector {css}: {e:?}")))
}

/// Action of the first `<form>` plus every `<input>` inside it carrying both
/// `name` and `value`. Later forms are ignored.
pub fn extract_form(html: &str) -> Result<HtmlForm, AppError> {
    let document = Html::parse_document(html);
    let inputs = selector("input")?;
    let Some(form) = document.select(&selector("form")?).next() else {
        return Ok(HtmlForm::default());
    };

    let action = form.value().attr("action").map(str::to_string);
    let fields = form
        .select(&inputs)
        .filter_map(|input| {
            let el = input.value();
            Some((el.attr("name")?, el.attr("value")?))
        })
        .collect();

    Ok(HtmlForm { action, fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_action_and_inputs_in_order() {
        let form = extract_form(
            r#"<form action="/x"><input name="a" value="1"><input name="b" value="2"></form>"#,
        )
        .expect("parse");
        assert_eq!(form.require_action().expect("action"), "/x");
        assert_eq!(
            form.fields.into_pairs(),
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn only_the_first_form_action_counts() {
        let form = extract_form(
            r#"<html><body>
                <form method="post" action="https://idp.example/saml"><input type="hidden" name="SAMLResponse" value="abc"/></form>
                <form action="https://elsewhere.example">
                  <input type="hidden" name="SAMLResponse" value="other"/>
                  <input type="hidden" name="RelayState" value="rs"/>
                </form>
            </body></html>"#,
        )
        .expect("parse");
        assert_eq!(form.action.as_deref(), Some("https://idp.example/saml"));
        assert_eq!(form.fields.get("SAMLResponse"), Some("abc"));
        assert_eq!(form.fields.get("RelayState"), None);
        assert_eq!(form.fields.len(), 1);
    }

    #[test]
    fn inputs_missing_name_or_value_are_skipped() {
        let form = extract_form(
            r#"<form action="/go">
                <input type="submit" value="Continue">
                <input name="nameless-value">
                <input name="RelayState" value="">
                <input name="token" value="t&amp;1">
            </form>"#,
        )
        .expect("parse");
        let names: Vec<&str> = form.fields.names().collect();
        assert_eq!(names, vec!["RelayState", "token"]);
        assert_eq!(form.fields.get("RelayState"), Some(""));
        assert_eq!(form.fields.get("token"), Some("t&1"));
    }

    #[test]
    fn repeated_names_keep_position_and_take_last_value() {
        let fields: FormFields = [("a", "1"), ("b", "2"), ("a", "3")].into_iter().collect();
        assert_eq!(
            fields.into_pairs(),
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn missing_action_is_a_malformed_document() {
        let form = extract_form("<html><body><p>Signed out</p></body></html>").expect("parse");
        assert!(form.action.is_none());
        assert!(matches!(form.require_action(), Err(AppError::MalformedDocument(_))));

        let blank = extract_form(r#"<form action=" "></form>"#).expect("parse");
        assert!(blank.require_action().is_err());
    }
}
