//! The run list: ordered resources with notification edges resolved to
//! positions at load time.

use super::attributes::flatten;
use super::error::LoadError;
use super::parser;
use super::recipe::{self, Repository};
use super::resolver;
use super::types::{NodeConfig, Resource, Timing};
use std::collections::HashMap;
use std::path::Path;

/// A notification resolved to the target's run-list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyEdge {
    pub target: usize,
    pub timing: Timing,
}

/// Validated, ordered sequence of resources.
#[derive(Debug, Clone)]
pub struct RunList {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<NotifyEdge>>,
}

impl RunList {
    /// Build from resolved resources, failing on the first invariant violation.
    pub fn build(resources: Vec<Resource>) -> Result<Self, LoadError> {
        if let Some(first) = parser::validate(&resources).into_iter().next() {
            return Err(first);
        }

        let index: HashMap<String, usize> = resources
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.identifier.clone(), pos))
            .collect();

        let mut edges = Vec::with_capacity(resources.len());
        for r in &resources {
            let mut out = Vec::with_capacity(r.notifies.len());
            for n in &r.notifies {
                let target = index.get(&n.target).copied().ok_or_else(|| {
                    LoadError::UnknownNotificationTarget {
                        source_id: r.identifier.clone(),
                        target: n.target.clone(),
                    }
                })?;
                out.push(NotifyEdge {
                    target,
                    timing: n.timing,
                });
            }
            edges.push(out);
        }

        for id in parser::unnotified_deferred(&resources) {
            tracing::warn!(resource = id, "deferred resource is never notified and will not run");
        }

        Ok(Self {
            resources,
            index,
            edges,
        })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Resource at a run-list position.
    pub fn at(&self, pos: usize) -> &Resource {
        &self.resources[pos]
    }

    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.index.get(identifier).copied()
    }

    pub fn get(&self, identifier: &str) -> Option<&Resource> {
        self.position(identifier).map(|pos| &self.resources[pos])
    }

    /// Notification edges of the resource at `pos`, in declared order.
    pub fn edges(&self, pos: usize) -> &[NotifyEdge] {
        &self.edges[pos]
    }
}

/// Resolve every recipe of an expanded run list and build the `RunList`.
pub fn load(root: &Path, node: &NodeConfig, items: &[String]) -> Result<RunList, LoadError> {
    let resources = load_resources(root, node, items)?;
    RunList::build(resources)
}

/// Expand and resolve without validating run-list invariants.
pub fn load_resources(
    root: &Path,
    node: &NodeConfig,
    items: &[String],
) -> Result<Vec<Resource>, LoadError> {
    let repo = Repository::new(root, node);
    let expansion = recipe::expand(&repo, items)?;

    let mut resources = Vec::new();
    for expanded in &expansion.recipes {
        let recipe_layer = flatten(&expanded.file.attributes);
        let origin = expanded.origin();
        let files_dir = repo.files_dir(&expanded.cookbook);
        for decl in &expanded.file.resources {
            resources.push(resolver::resolve_resource(
                decl,
                &recipe_layer,
                &expansion.role_layers,
                &origin,
                &files_dir,
            )?);
        }
    }

    tracing::debug!(
        recipes = expansion.recipes.len(),
        roles = expansion.roles.len(),
        resources = resources.len(),
        "run list expanded"
    );
    Ok(resources)
}
