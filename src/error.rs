/// Error captured from a failed fetch.
///
/// A fetch failure is never thrown to observers. It is stored on the entry
/// (next to any stale data, which stays visible) and delivered through the
/// normal update channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    /// Create a new fetch error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        FetchError {
            message: message.into(),
        }
    }

    /// The failure message reported by the fetcher.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for FetchError {
    fn from(message: String) -> Self {
        FetchError::new(message)
    }
}

impl From<&str> for FetchError {
    fn from(message: &str) -> Self {
        FetchError::new(message)
    }
}
