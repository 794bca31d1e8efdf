use thiserror::Error;

/// Input rejected before any network traffic happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid URL")]
    EmptyUrl,
}

/// Failure kinds of a single resolver round trip. All of them send the
/// session back to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("Invalid URL")]
    InvalidInput,

    #[error("Resolver did not answer in time")]
    Timeout,

    #[error("No response from server. Is the API server running?")]
    Unreachable,

    #[error("Server returned {0}")]
    ServerError(u16),

    #[error("No download links found!")]
    EmptyResult,

    #[error("Malformed resolver response: {0}")]
    MalformedResponse(String),
}

/// Terminal failures of a transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("Failed to start transfer: {0}")]
    Spawn(String),

    #[error("{}", exit_message(*.0))]
    NonZeroExit(Option<i32>),

    #[error("I/O error: {0}")]
    Io(String),
}

fn exit_message(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("Transfer exited with code {}", code),
        None => "Transfer terminated by signal".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_messages() {
        assert_eq!(
            TransferError::NonZeroExit(Some(2)).to_string(),
            "Transfer exited with code 2"
        );
        assert_eq!(
            TransferError::NonZeroExit(None).to_string(),
            "Transfer terminated by signal"
        );
    }

    #[test]
    fn test_app_error_is_transparent() {
        let err: AppError = ResolverError::ServerError(502).into();
        assert_eq!(err.to_string(), "Server returned 502");
    }
}
