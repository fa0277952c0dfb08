//! Database view models returned by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use crate::model::Catalog;
use serde::Serialize;

/// Row counts for one catalog.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CatalogStats {
    pub catalog: Catalog,
    pub total: i64,
    pub pending: i64,
    pub delivered: i64,
}
