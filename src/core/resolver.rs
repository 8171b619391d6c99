//! Resource resolution: name property, attribute layering and `{{node.*}}`
//! templates.
//!
//! Everything here runs at load time. The resulting `Resource` carries a
//! fully merged, immutable attribute set.

use super::attributes::{flatten, AttributeLayers, Attributes};
use super::error::LoadError;
use super::types::{Guard, Predicate, Resource, ResourceDecl, ResourceKind};
use std::path::Path;

/// Resolve all `{{node.key}}` references in a string.
///
/// A referenced value is itself resolved before substitution, so derived
/// attributes (`home: /home/{{node.python.user}}`) expand fully. A reference
/// chain that returns to a key already being resolved is an error.
pub fn resolve_template(template: &str, layers: &AttributeLayers) -> Result<String, String> {
    resolve_with(template, layers, &mut Vec::new())
}

fn resolve_with(
    template: &str,
    layers: &AttributeLayers,
    resolving: &mut Vec<String>,
) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim().to_string();

        let attr = match key.strip_prefix("node.") {
            Some(attr) => attr,
            None => return Err(format!("unknown template variable: {}", key)),
        };
        if resolving.iter().any(|k| k == attr) {
            resolving.push(attr.to_string());
            return Err(format!("template cycle: {}", resolving.join(" -> ")));
        }
        let raw = layers
            .lookup(attr)
            .ok_or_else(|| format!("unknown attribute: {}", attr))?;

        resolving.push(attr.to_string());
        let value = resolve_with(raw, layers, resolving)?;
        resolving.pop();

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

fn resolve_predicate(predicate: &Predicate, layers: &AttributeLayers) -> Result<Predicate, String> {
    Ok(match predicate {
        Predicate::FileExists(path) => Predicate::FileExists(resolve_template(path, layers)?),
        Predicate::CommandSucceeds(cmd) => {
            Predicate::CommandSucceeds(resolve_template(cmd, layers)?)
        }
        Predicate::FileContains { path, needle } => Predicate::FileContains {
            path: resolve_template(path, layers)?,
            needle: resolve_template(needle, layers)?,
        },
    })
}

fn resolve_guard(guard: &Guard, layers: &AttributeLayers) -> Result<Guard, String> {
    Ok(match guard {
        Guard::NotIf(p) => Guard::NotIf(resolve_predicate(p, layers)?),
        Guard::OnlyIf(p) => Guard::OnlyIf(resolve_predicate(p, layers)?),
    })
}

/// Turn a declaration into a resolved resource.
///
/// Layers, most specific first: the resource's own attributes (with the
/// kind's name attribute defaulted to the identifier), `recipe`, then `roles`.
pub fn resolve_resource(
    decl: &ResourceDecl,
    recipe: &Attributes,
    roles: &AttributeLayers,
    origin: &str,
    files_dir: &Path,
) -> Result<Resource, LoadError> {
    let template_err = |message: String| LoadError::Template {
        identifier: decl.identifier.clone(),
        message,
    };

    let mut own = flatten(&decl.attributes);
    let name_attr = decl.kind.name_attribute();
    if !own.contains(name_attr) {
        own.insert(name_attr, &decl.identifier);
    }

    let mut layers = roles.clone();
    layers.push_override(recipe.clone());
    layers.push_override(own);

    let mut attributes = Attributes::default();
    for (key, raw) in layers.merged().iter() {
        let value = resolve_template(raw, &layers).map_err(template_err)?;
        attributes.insert(key, &value);
    }

    if decl.kind == ResourceKind::CookbookFile {
        let source = match attributes.get("source") {
            Some(s) => s.to_string(),
            None => default_source(attributes.get("path").unwrap_or(&decl.identifier)),
        };
        let source_path = files_dir.join(&source);
        if !source_path.is_file() {
            return Err(LoadError::MissingCookbookFile {
                identifier: decl.identifier.clone(),
                path: source_path,
            });
        }
        attributes.insert("source", &source);
        attributes.insert("source_path", &source_path.to_string_lossy());
    }

    let guard = decl
        .guard
        .as_ref()
        .map(|g| resolve_guard(g, &layers))
        .transpose()
        .map_err(template_err)?;

    Ok(Resource {
        kind: decl.kind,
        identifier: decl.identifier.clone(),
        action: decl.action,
        guard,
        attributes,
        notifies: decl.notifies.clone(),
        origin: origin.to_string(),
    })
}

/// A cookbook file without `source` ships under its target's basename.
fn default_source(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
