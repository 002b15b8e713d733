//! # Collab
//!
//! Storage and API core for a collaborative binary-analysis service.
//!
//! Analysts upload files to projects, snapshot them as file versions, and
//! attach instances (functions, data blocks, whole-file "universal"
//! entries) with their feature vectors and annotations. Match tasks compare
//! a source file version against other files and record scored matches.
//!
//! The domain rules live in `collab-core`; this crate adds the SQLite
//! store, configuration, logging, and the `collab` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │   CLI    │──▶│ collab-core  │──▶│ SqliteStore │
//! │ (collab) │   │ rules+views  │   │  (sqlx)     │
//! └──────────┘   └──────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! collab init
//! collab project create --owner alice --name firmware
//! collab file create --owner alice --project 1 --name fw.bin --path ./fw.bin
//! collab version create --file 1 --path ./fw.bin --complete
//! collab instance import instances.json --owner alice
//! collab task create --owner alice --source-file-version 1 \
//!     --matcher instruction_hash --strategy all_strategy
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`hashing`] | SHA-256 content hashing |
//! | [`projects`] | Project, file, version and dependency commands |
//! | [`instances`] | Instance import and read shapes |
//! | [`tasks`] | Task lifecycle and match commands |
//! | [`catalog`] | Matcher and strategy listings |
//! | [`stats`] | Database summary |

pub mod catalog;
pub mod config;
pub mod db;
pub mod hashing;
pub mod instances;
pub mod logging;
pub mod migrate;
pub mod output;
pub mod projects;
pub mod sqlite_store;
pub mod stats;
pub mod tasks;
