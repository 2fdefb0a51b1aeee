//! arcana: declarative build automation.
//!
//! Arcana reads an arcfile describing variables, attributes, tasks,
//! mappings, asserts and execution directives, then plans and runs the
//! requested task through an interpreter, skipping jobs whose tracked
//! inputs are unchanged.
//!
//! # Architecture
//!
//! ```text
//! arcfile bytes
//!      │
//! ┌────▼─────┐   ┌───────────┐   ┌───────────┐
//! │  Lexer   ├──▶│  Grammar  ├──▶│ Collector │
//! └──────────┘   │  matcher  │   │ (tables)  │
//!                └───────────┘   └─────┬─────┘
//!                                      │ Environment
//!                ┌─────────────────────▼─────┐
//!                │ Post-processor            │
//!                │ align · glob · map ·      │
//!                │ assert · substitute       │
//!                └─────────────────────┬─────┘
//!                                      │
//!      ┌───────────┐   ┌───────────┐  │
//!      │   Cache   │◀──│ Executor  │◀─┴── Job planner
//!      │ (.arcana) │   │ seq/pool  │
//!      └───────────┘   └───────────┘
//! ```

pub mod builtins;
pub mod cache;
pub mod error;
pub mod exec;
pub mod fmt;
pub mod generator;
pub mod glob;
pub mod grammar;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod postproc;
pub mod semantic;
pub mod table;

pub use error::{ArcanaError, Result};
pub use semantic::Environment;

/// Crate version, substituted for `{arc:__version__}`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
