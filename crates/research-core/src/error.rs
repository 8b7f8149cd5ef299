//! Errors from LLM provider calls

/// Errors from LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("model returned an error: {0}")]
    Model(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),

    #[error("history cannot be combined with a list of prompts")]
    HistoryWithPromptList,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LlmError::ApiError {
            status: 401,
            message: "invalid api key".into(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid api key"));

        let err = LlmError::MissingApiKey("OPENAI_API_KEY".into());
        assert_eq!(err.to_string(), "missing API key: set OPENAI_API_KEY");
    }
}
