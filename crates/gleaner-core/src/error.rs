use thiserror::Error;

/// Setup, configuration and storage errors.
///
/// Per-key fetch failures use [`FetchError`] instead; they end up in the
/// failure ledger and never abort a run.
///
/// `std::io::Error` and `csv::Error` convert through `#[from]`, so store code
/// can use `?` directly:
///
/// ```no_run
/// use gleaner_core::error::AppError;
///
/// fn header(path: &std::path::Path) -> Result<Vec<String>, AppError> {
///     let mut reader = csv::Reader::from_path(path)?;
///     Ok(reader.headers()?.iter().map(str::to_string).collect())
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client could not be built or a request could not be prepared.
    #[error("API Client error: {0}")]
    ClientError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A work key could not be parsed.
    #[error("Invalid work key: {0}")]
    InvalidWorkKey(String),

    /// The work-key source is unusable (inverted range, empty file, ...).
    #[error("Invalid work source: {0}")]
    InvalidWorkSource(String),

    /// Configuration file missing, unreadable or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A persisted store is inconsistent with what the harvester expects,
    /// e.g. a result table whose header does not match the catalog's columns.
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Message for terminal output, with a hint where one helps.
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_core::error::AppError;
    ///
    /// let err = AppError::ConfigError("Catalog 'x' not found".to_string());
    /// assert!(err.user_message().contains("catalogs.toml"));
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            AppError::Io(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    format!("Permission denied: {}\n   Check the catalog data directory.", e)
                } else {
                    format!("File error: {}", e)
                }
            }
            AppError::ClientError(msg) => format!("HTTP client error: {}", msg),
            AppError::InvalidUrl(url) => {
                format!("Invalid URL: {}\n   Check the catalog url in catalogs.toml.", url)
            }
            AppError::InvalidWorkSource(msg) => {
                format!(
                    "Nothing to harvest: {}\n   Example: gleaner harvest hitachi-cross-reference --start 1 --end 100",
                    msg
                )
            }
            AppError::ConfigError(msg) => {
                format!("{}\n   Check your catalogs.toml.", msg)
            }
            AppError::StoreError(msg) => {
                format!(
                    "{}\n   The data directory may belong to another catalog; run `gleaner status` to inspect it.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Category of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// DNS, TCP or TLS failure.
    Connection,
    /// The server answered with a non-success status.
    HttpStatus(u16),
    /// The server answered with an empty or truncated body.
    EmptyResponse,
    /// The body could not be decoded (e.g. invalid JSON from a search API).
    Malformed,
}

/// Failure of a single fetch, as reported by a [`crate::traits::Fetcher`] or
/// [`crate::traits::SearchIndex`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self::new(
            FetchErrorKind::Timeout,
            format!("Request timeout after {} seconds", secs),
        )
    }

    pub fn status(code: u16, detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::HttpStatus(code), detail)
    }
}
