use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    /// A redirect or header the flow depends on was not present.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The remote page or script no longer has the structure we scrape.
    #[error("protocol shape changed: {0}")]
    ProtocolShapeChanged(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("login failed: {source}")]
    LoginFailed {
        #[source]
        source: Box<AppError>,
    },

    #[error("authentication required: log in before calling the provider")]
    AuthenticationRequired,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl AppError {
    pub fn login_failed(cause: AppError) -> Self {
        match cause {
            already @ AppError::LoginFailed { .. } => already,
            other => AppError::LoginFailed {
                source: Box::new(other),
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::HttpStatus { status, .. } if *status == 401 || *status == 403)
    }

    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::LoginFailed { source } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn login_failed_keeps_original_cause() {
        let err = AppError::login_failed(AppError::UnexpectedResponse("no Location".into()));
        assert!(matches!(
            err.root_cause(),
            AppError::UnexpectedResponse(msg) if msg == "no Location"
        ));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("login failed"));
    }

    #[test]
    fn login_failed_is_not_double_wrapped() {
        let inner = AppError::login_failed(AppError::AuthenticationRequired);
        let outer = AppError::login_failed(inner);
        match outer {
            AppError::LoginFailed { source } => {
                assert!(matches!(*source, AppError::AuthenticationRequired))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unauthorized_covers_401_and_403_only() {
        let status = |status| AppError::HttpStatus {
            status,
            url: "https://example.invalid".into(),
        };
        assert!(status(401).is_unauthorized());
        assert!(status(403).is_unauthorized());
        assert!(!status(500).is_unauthorized());
        assert!(!AppError::AuthenticationRequired.is_unauthorized());
    }
}
