//! Database module: catalog view models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: view models returned by repositories.
//! - `repo`: SQL-only functions that map rows into `crate::model` types.
//!
//! External modules should import from `jwst_galley::db`; the repository API
//! and its error type are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::CatalogStats;
