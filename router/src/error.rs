/// Failure talking to an external collaborator (identification service,
/// secret store).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} timed out")]
    Timeout { service: &'static str },
    #[error("{service} unreachable: {message}")]
    Unreachable {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("{service} returned a malformed response: {message}")]
    Malformed {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn from_reqwest(service: &'static str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout { service }
        } else if e.is_decode() {
            ServiceError::Malformed {
                service,
                message: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            ServiceError::Status {
                service,
                status: status.as_u16(),
            }
        } else {
            ServiceError::Unreachable {
                service,
                message: e.to_string(),
            }
        }
    }

    /// Whether a later attempt could succeed. Callers never retry an unlock
    /// decision automatically; this only tells the logs what kind of failure
    /// it was.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout { .. } | ServiceError::Unreachable { .. } => true,
            ServiceError::Status { status, .. } => *status >= 500 || *status == 429,
            ServiceError::Malformed { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ServiceError::Timeout { service: "x" }.is_retryable());
        assert!(ServiceError::Status { service: "x", status: 503 }.is_retryable());
        assert!(!ServiceError::Status { service: "x", status: 401 }.is_retryable());
        assert!(!ServiceError::Malformed {
            service: "x",
            message: "null".into()
        }
        .is_retryable());
    }
}
