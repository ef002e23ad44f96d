//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: rows returned by and written through repositories.
//! - `repo`: SQL-only functions over the `catalogue` and `trans_unit` tables.
//!
//! The repository API is re-exported at `crate::db::*`.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{NewUnit, UnitRow};
