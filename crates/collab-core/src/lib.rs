//! # Collab Core
//!
//! Storage-agnostic logic for the collab backend of a collaborative
//! binary comparison tool: the record model, the [`store::Store`] trait with
//! an in-memory implementation, instance aggregate writes, display-name
//! resolution, the task lifecycle, and read-side view projections.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The SQLite store
//! and the command-line front-end live in the `collab` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Records, status/type enums, matcher and strategy catalog |
//! | [`error`] | Typed errors and `Result` alias |
//! | [`store`] | `Store` trait and `InMemoryStore` |
//! | [`records`] | Project, file, version, match and dependency write paths |
//! | [`aggregate`] | Instance + vectors + annotations in one write |
//! | [`naming`] | Instance display names and annotation counts |
//! | [`task`] | Task creation, frozen-field edits, runner progress |
//! | [`views`] | Slim, counted and nested instance shapes; flat projections |

pub mod aggregate;
pub mod error;
pub mod models;
pub mod naming;
pub mod records;
pub mod store;
pub mod task;
pub mod views;

pub use error::{Error, Result};
