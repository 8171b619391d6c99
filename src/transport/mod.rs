//! Executor seam: how the engine applies actions and evaluates probes.

pub mod local;

use crate::core::attributes::Attributes;
use crate::core::error::{ExecutionError, ProbeError};
use crate::core::types::{Predicate, ResourceKind};

pub use local::LocalExecutor;

/// Output from executing a script on the host.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Performs actions and answers guard predicates for the engine.
///
/// Implementations own all side effects. The engine never touches the host
/// itself, so tests drive it with recording fakes.
pub trait Executor {
    /// Apply a resource's action. Returns captured output on success.
    fn execute(
        &mut self,
        kind: ResourceKind,
        attributes: &Attributes,
    ) -> Result<String, ExecutionError>;

    /// Evaluate a guard predicate against current host state.
    fn probe(&mut self, predicate: &Predicate) -> Result<bool, ProbeError>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn execute(
        &mut self,
        kind: ResourceKind,
        attributes: &Attributes,
    ) -> Result<String, ExecutionError> {
        (**self).execute(kind, attributes)
    }

    fn probe(&mut self, predicate: &Predicate) -> Result<bool, ProbeError> {
        (**self).probe(predicate)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(
        &mut self,
        kind: ResourceKind,
        attributes: &Attributes,
    ) -> Result<String, ExecutionError> {
        (**self).execute(kind, attributes)
    }

    fn probe(&mut self, predicate: &Predicate) -> Result<bool, ProbeError> {
        (**self).probe(predicate)
    }
}
