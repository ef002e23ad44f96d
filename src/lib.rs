//! Translation catalogues stored in SQLite, with cache invalidation on change.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod source;

pub use error::CatalogError;
pub use model::{CatalogueName, Message, RejectReason, SourceCheck, Variant, VariantPolicy};
pub use source::MessageSource;
