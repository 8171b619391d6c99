//! tend: single-host convergence engine.
//!
//! Recipes and roles expand into an ordered run list of resources. Each
//! resource is guarded by a predicate, applied through an executor, and may
//! notify other resources immediately or at the end of the run.

pub mod cli;
pub mod core;
pub mod journal;
pub mod resources;
pub mod transport;
