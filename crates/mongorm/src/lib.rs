//! Declarative MongoDB models
//!
//! mongorm sits on top of the official `mongodb` driver. A model is declared
//! once as a [`Schema`] and used through a [`Model`] handle bound to a
//! [`Connection`].
//!
//! # Features
//! - Compact sort and index specifications (`"tenant_id, created_at desc"`)
//! - Default values resolved through a schema ancestry
//! - Uniqueness checks over unique field groups
//! - Page-number pagination
//! - Write error capture and optional transactions around every operation

pub mod action;
pub mod config;
pub mod connection;
pub mod model;
pub mod pagination;
pub mod record;
pub mod schema;
pub mod sort;
pub mod unique;
pub mod validation;

pub use action::CollectionAction;
pub use config::{MongormConfig, PoolConfig};
pub use connection::Connection;
pub use model::{FindArgs, FindOneFilter, Model, WriteOptions, WriteOutcome};
pub use mongorm_common::{MongormError, Result};
pub use pagination::{Page, PageArgs, PageOverrides, PageSource};
pub use record::{Record, Saved, ToDocumentOptions};
pub use schema::{IndexDeclaration, Schema, SchemaBuilder};
pub use sort::{get_sort, Direction, SortInput, SortKeys, SortSpec};
pub use unique::{build_unique_filter, UniqueCheck};
pub use validation::{get_oid, is_valid_oid, new_id, ValidatedCollectionName, ValidatedFieldName};

pub use bson;
pub use mongodb;
