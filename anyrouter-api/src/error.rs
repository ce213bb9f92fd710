use reqwest::StatusCode;

#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    Status(StatusCode, String),
    Decode(serde_json::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        ApiError::Http(value)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "Network error: {}", e),
            ApiError::Status(status, detail) if detail.is_empty() => {
                write!(f, "HTTP {}", status)
            }
            ApiError::Status(status, detail) => write!(f, "HTTP {}: {}", status, detail),
            ApiError::Decode(e) => write!(f, "invalid response body: {}", e),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            ApiError::Decode(e) => Some(e),
            ApiError::Status(..) => None,
        }
    }
}
