use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),
    #[error("Column '{column}' not found. Available columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },
    #[error("No URL to process")]
    NoUrls,
    #[error("Existing output {} does not match schema v{version} (header: {found:?})", .path.display())]
    SchemaMismatch {
        path: PathBuf,
        version: u32,
        found: Vec<String>,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Failure while fetching one page. The `Display` text is what lands in the
/// row's `error` column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Timeout")]
    Timeout,
    #[error("HTTP error: {0}")]
    Network(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("Non-HTML content type: {content_type}")]
    NotHtml { status: u16, content_type: String },
    #[error("Parse error: {message}")]
    Parse { status: u16, message: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Timeout | FetchError::Network(_) => None,
            FetchError::Status(status)
            | FetchError::NotHtml { status, .. }
            | FetchError::Parse { status, .. } => Some(*status),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}
