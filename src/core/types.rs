//! Resource, recipe, role and report types.
//!
//! Declarations (`ResourceDecl`, `RecipeFile`, `RoleFile`, `NodeConfig`) are the
//! YAML schema. `Resource` is the immutable, fully resolved form the engine
//! consumes, and `RunReport` is what a converge returns.

use super::attributes::Attributes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Resources
// ============================================================================

/// What kind of action a resource performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Run a shell command.
    Execute,
    /// Install a system package.
    Package,
    /// Deploy a file shipped in the cookbook's `files/` directory.
    CookbookFile,
}

impl ResourceKind {
    /// Attribute that defaults to the resource identifier when unset.
    pub fn name_attribute(&self) -> &'static str {
        match self {
            Self::Execute => "command",
            Self::Package => "package_name",
            Self::CookbookFile => "path",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::Package => write!(f, "package"),
            Self::CookbookFile => write!(f, "cookbook_file"),
        }
    }
}

/// When a resource runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Run in declared order.
    #[default]
    Run,
    /// Dormant until another resource notifies it.
    Deferred,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Host-observable condition, probed through the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    FileExists(String),
    CommandSucceeds(String),
    FileContains { path: String, needle: String },
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileExists(path) => write!(f, "file_exists({})", path),
            Self::CommandSucceeds(cmd) => write!(f, "command_succeeds({})", cmd),
            Self::FileContains { path, needle } => {
                write!(f, "file_contains({}, {:?})", path, needle)
            }
        }
    }
}

/// Idempotence guard on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Skip when the predicate holds.
    NotIf(Predicate),
    /// Skip unless the predicate holds.
    OnlyIf(Predicate),
}

impl Guard {
    pub fn predicate(&self) -> &Predicate {
        match self {
            Self::NotIf(p) | Self::OnlyIf(p) => p,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotIf(p) => write!(f, "not_if {}", p),
            Self::OnlyIf(p) => write!(f, "only_if {}", p),
        }
    }
}

/// Notification timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Run the target right after the notifier, before the walk continues.
    Immediate,
    /// Run the target once, after the whole run list has been walked.
    #[default]
    Delayed,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Delayed => write!(f, "delayed"),
        }
    }
}

/// A request to run another resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub target: String,
    #[serde(default)]
    pub timing: Timing,
}

/// A resource as declared in a recipe file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    pub kind: ResourceKind,

    #[serde(rename = "id")]
    pub identifier: String,

    #[serde(default)]
    pub action: Action,

    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub guard: Option<Guard>,

    /// Raw attribute values (scalars, sequences or nested mappings)
    #[serde(default)]
    pub attributes: IndexMap<String, serde_yaml_ng::Value>,

    #[serde(default)]
    pub notifies: Vec<Notification>,
}

/// A fully resolved resource. Immutable once the run list is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub identifier: String,
    pub action: Action,
    pub guard: Option<Guard>,
    pub attributes: Attributes,
    pub notifies: Vec<Notification>,
    /// `cookbook::recipe` this resource was declared in
    pub origin: String,
}

impl Resource {
    /// A bare `run` resource with no guard, attributes or notifications.
    pub fn new(kind: ResourceKind, identifier: &str) -> Self {
        Self {
            kind,
            identifier: identifier.to_string(),
            action: Action::Run,
            guard: None,
            attributes: Attributes::default(),
            notifies: Vec::new(),
            origin: String::new(),
        }
    }

    pub fn deferred(mut self) -> Self {
        self.action = Action::Deferred;
        self
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn notifying(mut self, target: &str, timing: Timing) -> Self {
        self.notifies.push(Notification {
            target: target.to_string(),
            timing,
        });
        self
    }
}

// ============================================================================
// Recipes and roles
// ============================================================================

/// `cookbooks/<cookbook>/recipes/<recipe>.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeFile {
    /// Recipe-level attribute defaults
    #[serde(default)]
    pub attributes: IndexMap<String, serde_yaml_ng::Value>,

    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

/// `roles/<role>.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleFile {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub run_list: Vec<String>,

    #[serde(default)]
    pub default_attributes: IndexMap<String, serde_yaml_ng::Value>,
}

// ============================================================================
// Node configuration
// ============================================================================

/// Root configuration (`tend.yaml`): what to converge on this host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Host name recorded in reports and state paths
    #[serde(default = "default_host")]
    pub host: String,

    /// Cookbook directory, relative to the repository root
    #[serde(default = "default_cookbook_path")]
    pub cookbook_path: String,

    /// Role directory, relative to the repository root
    #[serde(default = "default_role_path")]
    pub role_path: String,

    /// Ordered run list items (`recipe[..]`, `role[..]`)
    #[serde(default)]
    pub run_list: Vec<String>,

    #[serde(default)]
    pub policy: Policy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            cookbook_path: default_cookbook_path(),
            role_path: default_role_path(),
            run_list: Vec::new(),
            policy: Policy::default(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_cookbook_path() -> String {
    "cookbooks".to_string()
}

fn default_role_path() -> String {
    "roles".to_string()
}

/// Converge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub failure: FailurePolicy,

    /// Append JSONL events under the state directory
    #[serde(default = "default_true")]
    pub journal: bool,

    /// Persist the last run report under the state directory
    #[serde(default = "default_true")]
    pub save_report: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            failure: FailurePolicy::default(),
            journal: true,
            save_report: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// What a failed resource does to the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep going.
    #[default]
    Continue,
    /// Abort the run at the first failure.
    StopOnFirst,
}

// ============================================================================
// Run report
// ============================================================================

/// Per-run execution status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Skipped,
    Executed,
    Failed,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Final fate of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub identifier: String,
    pub kind: ResourceKind,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub duration_seconds: f64,
}

/// Ordered account of a converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub host: String,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,

    /// Entries in the order resources left `pending`
    pub entries: Vec<ReportEntry>,

    /// Resources never reached, in run-list order
    #[serde(default)]
    pub untouched: Vec<String>,

    /// Stopped early by failure policy or cancellation
    #[serde(default)]
    pub aborted: bool,

    /// No entry failed and the run was not aborted
    pub success: bool,
}

impl RunReport {
    pub fn count(&self, status: ResourceStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn entry(&self, identifier: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    /// Identifiers in report order.
    pub fn identifiers(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.identifier.as_str()).collect()
    }
}

// ============================================================================
// Journal events
// ============================================================================

/// Event appended to the per-host JSONL journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    ConvergeStarted {
        host: String,
        run_id: String,
        run_list_digest: String,
        resources: usize,
    },
    ResourceExecuted {
        host: String,
        resource: String,
        duration_seconds: f64,
    },
    ResourceSkipped {
        host: String,
        resource: String,
        guard: String,
    },
    ResourceFailed {
        host: String,
        resource: String,
        error: String,
    },
    ProbeFailed {
        host: String,
        resource: String,
        error: String,
    },
    ConvergeCompleted {
        host: String,
        run_id: String,
        executed: usize,
        skipped: usize,
        failed: usize,
        aborted: bool,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: JournalEvent,
}

// ============================================================================
// YAML helper
// ============================================================================

/// Convert a scalar `serde_yaml_ng::Value` to its attribute string form.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        serde_yaml_ng::Value::Sequence(items) => items
            .iter()
            .map(yaml_value_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => format!("{:?}", other),
    }
}
