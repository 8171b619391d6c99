//! Recipe and role loading, and run-list expansion.
//!
//! A run list names recipes (`recipe[cookbook]`, `recipe[cookbook::recipe]`)
//! and roles (`role[name]`). Roles expand depth-first into their own run
//! lists; a recipe reached more than once is only expanded the first time.

use super::attributes::{flatten, AttributeLayers};
use super::error::LoadError;
use super::types::{NodeConfig, RecipeFile, RoleFile};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static RUN_LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(recipe|role)\[([A-Za-z0-9_.-]+)(?:::([A-Za-z0-9_.-]+))?\]$")
        .unwrap_or_else(|e| panic!("run list pattern: {}", e))
});

/// One entry of a run list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunListItem {
    Recipe { cookbook: String, recipe: String },
    Role(String),
}

impl fmt::Display for RunListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recipe { cookbook, recipe } => write!(f, "recipe[{}::{}]", cookbook, recipe),
            Self::Role(name) => write!(f, "role[{}]", name),
        }
    }
}

/// Parse `recipe[cookbook]`, `recipe[cookbook::recipe]` or `role[name]`.
pub fn parse_run_list_item(item: &str) -> Result<RunListItem, LoadError> {
    let caps = RUN_LIST_ITEM
        .captures(item.trim())
        .ok_or_else(|| LoadError::MalformedRunListItem(item.to_string()))?;

    let name = caps[2].to_string();
    match (&caps[1], caps.get(3)) {
        ("recipe", Some(recipe)) => Ok(RunListItem::Recipe {
            cookbook: name,
            recipe: recipe.as_str().to_string(),
        }),
        ("recipe", None) => Ok(RunListItem::Recipe {
            cookbook: name,
            recipe: "default".to_string(),
        }),
        ("role", None) => Ok(RunListItem::Role(name)),
        _ => Err(LoadError::MalformedRunListItem(item.to_string())),
    }
}

/// On-disk layout of a recipe repository.
#[derive(Debug, Clone)]
pub struct Repository {
    cookbook_dir: PathBuf,
    role_dir: PathBuf,
}

impl Repository {
    pub fn new(root: &Path, node: &NodeConfig) -> Self {
        Self {
            cookbook_dir: root.join(&node.cookbook_path),
            role_dir: root.join(&node.role_path),
        }
    }

    pub fn recipe_path(&self, cookbook: &str, recipe: &str) -> PathBuf {
        self.cookbook_dir
            .join(cookbook)
            .join("recipes")
            .join(format!("{}.yaml", recipe))
    }

    pub fn role_path(&self, name: &str) -> PathBuf {
        self.role_dir.join(format!("{}.yaml", name))
    }

    /// Directory `cookbook_file` sources are read from.
    pub fn files_dir(&self, cookbook: &str) -> PathBuf {
        self.cookbook_dir.join(cookbook).join("files")
    }

    /// Load `cookbooks/<cookbook>/recipes/<recipe>.yaml`.
    pub fn load_recipe(&self, cookbook: &str, recipe: &str) -> Result<RecipeFile, LoadError> {
        let path = self.recipe_path(cookbook, recipe);
        if !path.is_file() {
            return Err(LoadError::RecipeNotFound {
                cookbook: cookbook.to_string(),
                recipe: recipe.to_string(),
                path,
            });
        }
        let content = read(&path)?;
        parse_recipe(&content).map_err(|message| LoadError::Parse { path, message })
    }

    /// Load `roles/<name>.yaml`.
    pub fn load_role(&self, name: &str) -> Result<RoleFile, LoadError> {
        let path = self.role_path(name);
        if !path.is_file() {
            return Err(LoadError::RoleNotFound {
                name: name.to_string(),
                path,
            });
        }
        let content = read(&path)?;
        let role: RoleFile = serde_yaml_ng::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if role.name != name {
            tracing::warn!(file = %path.display(), declared = %role.name, "role name does not match file name");
        }
        Ok(role)
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a recipe from a YAML string.
pub fn parse_recipe(yaml: &str) -> Result<RecipeFile, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("recipe parse error: {}", e))
}

/// A recipe in its position within the expanded run list.
#[derive(Debug, Clone)]
pub struct ExpandedRecipe {
    pub cookbook: String,
    pub recipe: String,
    pub file: RecipeFile,
}

impl ExpandedRecipe {
    /// `cookbook::recipe`
    pub fn origin(&self) -> String {
        format!("{}::{}", self.cookbook, self.recipe)
    }
}

/// Result of expanding a run list.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Recipes in effective order, each at most once
    pub recipes: Vec<ExpandedRecipe>,
    /// Role default attributes, most specific first
    pub role_layers: AttributeLayers,
    /// Roles in the order they were expanded
    pub roles: Vec<String>,
}

/// Expand run-list items into an ordered, de-duplicated recipe sequence.
///
/// Role defaults are layered post-order: a role overrides the roles it
/// includes, and a role later in the run list overrides earlier ones.
pub fn expand(repo: &Repository, items: &[String]) -> Result<Expansion, LoadError> {
    let mut state = ExpandState::default();
    for item in items {
        let parsed = parse_run_list_item(item)?;
        state.visit(repo, &parsed)?;
    }
    Ok(state.out)
}

#[derive(Default)]
struct ExpandState {
    out: Expansion,
    seen_recipes: HashSet<String>,
    seen_roles: HashSet<String>,
    stack: Vec<String>,
}

impl ExpandState {
    fn visit(&mut self, repo: &Repository, item: &RunListItem) -> Result<(), LoadError> {
        match item {
            RunListItem::Recipe { cookbook, recipe } => {
                let key = format!("{}::{}", cookbook, recipe);
                if !self.seen_recipes.insert(key) {
                    tracing::debug!(recipe = %item, "recipe already in run list, skipping");
                    return Ok(());
                }
                let file = repo.load_recipe(cookbook, recipe)?;
                self.out.recipes.push(ExpandedRecipe {
                    cookbook: cookbook.clone(),
                    recipe: recipe.clone(),
                    file,
                });
                Ok(())
            }
            RunListItem::Role(name) => {
                if self.stack.contains(name) {
                    let mut chain = self.stack.clone();
                    chain.push(name.clone());
                    return Err(LoadError::RoleCycle(chain.join(" -> ")));
                }
                if !self.seen_roles.insert(name.clone()) {
                    return Ok(());
                }
                let role = repo.load_role(name)?;
                self.stack.push(name.clone());
                for entry in &role.run_list {
                    let parsed = parse_run_list_item(entry)?;
                    self.visit(repo, &parsed)?;
                }
                self.stack.pop();
                self.out
                    .role_layers
                    .push_override(flatten(&role.default_attributes));
                self.out.roles.push(name.clone());
                Ok(())
            }
        }
    }
}
