//! Row models used by repositories.
//!
//! Keep these structs focused on the data moved by queries. Catalogue rules
//! live in `crate::source`.

use chrono::{DateTime, Utc};

/// `trans_unit` slice loaded for lookups.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnitRow {
    pub id: i64,
    pub source: String,
    pub target: String,
    pub comments: String,
}

/// Values for a single `trans_unit` insert. `msg` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUnit<'a> {
    pub catalogue_id: i64,
    pub source: &'a str,
    pub target: &'a str,
    pub comments: &'a str,
    pub user_id: i64,
    pub at: DateTime<Utc>,
}
