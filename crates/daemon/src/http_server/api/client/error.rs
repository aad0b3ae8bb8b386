use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl ApiError {
    /// The server rejected the request because another writer got there first
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::HttpStatus(status, _) if *status == StatusCode::CONFLICT)
    }
}
