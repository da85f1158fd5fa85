use reqwest::StatusCode;
use thiserror::Error;

/// Every failure a store, workflow or flow can report. None of them are fatal:
/// callers convert them into a notice and leave prior state intact.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
    },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            ClientError::Unauthorized(_) => true,
            ClientError::Status { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
            _ => false,
        }
    }

    /// Text shown to the user in a notice.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Network(_) => "Unable to reach the server. Please try again.".to_string(),
            ClientError::Status { message, .. } | ClientError::Rejected(message)
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            ClientError::Status { status, .. } => format!("Request failed ({})", status),
            ClientError::Rejected(_) => "Request was rejected by the server".to_string(),
            ClientError::Validation(msg) | ClientError::Unauthorized(msg) => msg.clone(),
            ClientError::Decode(_) => "Unexpected response from the server".to_string(),
            ClientError::Storage(_) => "Could not access local session storage".to_string(),
            ClientError::InvalidUrl(url) => format!("Invalid request address: {}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_server_text() {
        let err = ClientError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "Slot already taken".into(),
        };
        assert_eq!(err.user_message(), "Slot already taken");

        let err = ClientError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "".into(),
        };
        assert!(err.user_message().contains("500"));
    }

    #[test]
    fn classifies_status_codes() {
        let nf = ClientError::Status {
            status: StatusCode::NOT_FOUND,
            message: String::new(),
        };
        assert!(nf.is_not_found());
        assert!(!nf.is_unauthorized());

        let forbidden = ClientError::Status {
            status: StatusCode::FORBIDDEN,
            message: String::new(),
        };
        assert!(forbidden.is_unauthorized());
        assert!(ClientError::Unauthorized("x".into()).is_unauthorized());
    }
}
