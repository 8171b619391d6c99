//! Core convergence logic: types, loading, resolution, guards, notifications
//! and the engine.

pub mod attributes;
pub mod codegen;
pub mod engine;
pub mod error;
pub mod guard;
pub mod notify;
pub mod parser;
pub mod recipe;
pub mod resolver;
pub mod runlist;
pub mod state;
pub mod types;
