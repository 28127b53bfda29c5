use std::fmt;

/// Errors from the token endpoint and the indicator endpoints.
///
/// None of these are retried: every call is single-attempt.
#[derive(Debug)]
pub enum GraphError {
    /// The token exchange completed but returned no access token.
    Auth(String),
    /// Network or connection failure.
    Transport(String),
    /// A response body could not be decoded into the expected shape.
    Decode(String),
    /// The remote answered with a non-success status and no usable payload.
    Api { status: u16, message: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Auth(msg) => write!(f, "auth error: {msg}"),
            GraphError::Transport(msg) => write!(f, "transport error: {msg}"),
            GraphError::Decode(msg) => write!(f, "decode error: {msg}"),
            GraphError::Api { status, message } => {
                write!(f, "api error status={status}: {message}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

impl From<reqwest::Error> for GraphError {
    fn from(e: reqwest::Error) -> Self {
        GraphError::Transport(e.to_string())
    }
}

/// Keep error bodies short in messages and logs.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_api_error() {
        let err = GraphError::Api {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "api error status=403: forbidden");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(400);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 515);
    }
}
