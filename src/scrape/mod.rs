//! Scrapers for the SSO pages: HTML forms and inline `setItem` script literals.

pub mod form;
pub mod script;

pub use form::{extract_form, FormFields, HtmlForm};
pub use script::{extract_literals, ScriptLiterals};
