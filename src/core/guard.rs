//! Guard evaluation: decide whether a resource's action is redundant.

use super::error::ProbeError;
use super::types::{Guard, Resource};
use crate::transport::Executor;

/// True if the resource must not run this pass.
///
/// `not_if` skips when its predicate holds, `only_if` skips when it does
/// not. A probe failure is returned to the caller unchanged.
pub fn should_skip<E: Executor + ?Sized>(
    resource: &Resource,
    executor: &mut E,
) -> Result<bool, ProbeError> {
    match &resource.guard {
        None => Ok(false),
        Some(Guard::NotIf(predicate)) => executor.probe(predicate),
        Some(Guard::OnlyIf(predicate)) => executor.probe(predicate).map(|holds| !holds),
    }
}
