//! Error types returned by the message source.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid input: {0}")]
    Validation(&'static str),

    #[error("invalid catalogue variant: {0}")]
    InvalidVariant(String),

    #[error("catalogue not found: {0}")]
    CatalogueNotFound(String),

    #[error("message not found in {catalogue}: {text}")]
    MessageNotFound { catalogue: String, text: String },

    #[error("{rows} messages match {text} in {catalogue}")]
    Ambiguous {
        catalogue: String,
        text: String,
        rows: u64,
    },

    #[error("message already exists in {catalogue}: {text}")]
    Duplicate { catalogue: String, text: String },

    #[error("no untranslated messages queued")]
    EmptyBatch,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl CatalogError {
    /// True for store failures a caller may retry; false for outcomes
    /// caused by the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Database(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::CatalogueNotFound(_) | CatalogError::MessageNotFound { .. }
        )
    }
}
