use thiserror::Error;

pub type AstResult<T> = Result<T, AstError>;

#[derive(Error, Debug)]
pub enum AstError {
    /// The input package is malformed beyond recovery.
    #[error("malformed document package: {message}")]
    Format { message: String },

    /// A single raw shadow fragment could not be parsed. Recovered locally by callers.
    #[error("unparsable {expected} shadow: {message}")]
    ShadowParse { expected: String, message: String },

    #[error("unsupported schema_version {found:?} (expected major version {expected})")]
    UnsupportedSchema { found: String, expected: String },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl AstError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Flattens an `anyhow` chain from the package/XML layer into a format error.
    pub fn from_package(err: anyhow::Error) -> Self {
        Self::Format {
            message: format!("{err:#}"),
        }
    }

    pub fn shadow_parse(expected: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShadowParse {
            expected: expected.into(),
            message: message.into(),
        }
    }
}
