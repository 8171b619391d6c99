//! CLI subcommands: init, validate, plan, converge, status.

use crate::core::engine::{CancelToken, Engine, EngineConfig};
use crate::core::types::{
    Action, FailurePolicy, NodeConfig, ReportEntry, ResourceStatus, RunReport,
};
use crate::core::{parser, runlist, state};
use crate::journal::Journal;
use crate::transport::LocalExecutor;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new tend repository
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Load and check the run list without touching the host
    Validate {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// Show the expanded run list: order, guards and notifications
    Plan {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// Converge this host toward the run list
    Converge {
        #[command(flatten)]
        repo: RepoArgs,

        /// Override the configured failure policy
        #[arg(long, value_enum)]
        failure: Option<FailurePolicy>,

        /// Evaluate guards but only report the actions that would run
        #[arg(long)]
        why_run: bool,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Show the last converge report per host
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Only this host
        #[arg(long)]
        host: Option<String>,
    },
}

/// Where the repository lives and which run list to use.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Repository root
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Node config, relative to the repository root
    #[arg(short, long, default_value = "tend.yaml")]
    pub config: PathBuf,

    /// Run-list item replacing the configured run list (repeatable)
    #[arg(long = "run-list", value_name = "ITEM")]
    pub run_list: Vec<String>,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { repo } => cmd_validate(&repo),
        Commands::Plan { repo } => cmd_plan(&repo),
        Commands::Converge {
            repo,
            failure,
            why_run,
            state_dir,
        } => cmd_converge(&repo, failure, why_run, &state_dir, interrupt_token()),
        Commands::Status { state_dir, host } => cmd_status(&state_dir, host.as_deref()),
    }
}

/// Token cancelled by SIGINT. The first interrupt lets the resource in
/// flight finish and the report get written; a second one exits at once.
fn interrupt_token() -> CancelToken {
    static TOKEN: OnceLock<CancelToken> = OnceLock::new();
    TOKEN
        .get_or_init(|| {
            let token = CancelToken::new();
            let handler = token.clone();
            let installed = ctrlc::set_handler(move || {
                if handler.is_cancelled() {
                    std::process::exit(130);
                }
                eprintln!("interrupted: stopping after the current resource");
                handler.cancel();
            });
            if let Err(e) = installed {
                tracing::warn!(error = %e, "cannot install interrupt handler");
            }
            token
        })
        .clone()
}

const NODE_TEMPLATE: &str = r#"host: localhost
cookbook_path: cookbooks
role_path: roles
run_list:
  - role[base]
policy:
  failure: continue
  journal: true
  save_report: true
"#;

const ROLE_TEMPLATE: &str = r#"name: base
description: Baseline for every host
run_list:
  - recipe[example]
default_attributes:
  example:
    greeting: hello
"#;

const RECIPE_TEMPLATE: &str = r#"attributes:
  example:
    marker: /tmp/tend-example
resources:
  - kind: execute
    id: write-marker
    attributes:
      command: "echo {{node.example.greeting}} > {{node.example.marker}}"
    guard:
      not_if:
        file_exists: "{{node.example.marker}}"
    notifies:
      - target: announce
        timing: delayed
  - kind: execute
    id: announce
    action: deferred
    attributes:
      command: "cat {{node.example.marker}}"
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join("tend.yaml");
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    let files = [
        (config_path.clone(), NODE_TEMPLATE),
        (path.join("roles/base.yaml"), ROLE_TEMPLATE),
        (
            path.join("cookbooks/example/recipes/default.yaml"),
            RECIPE_TEMPLATE,
        ),
    ];
    for (file, content) in &files {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        std::fs::write(file, content)
            .with_context(|| format!("cannot write {}", file.display()))?;
    }
    for dir in ["cookbooks/example/files", "state"] {
        std::fs::create_dir_all(path.join(dir))
            .with_context(|| format!("cannot create {}", path.join(dir).display()))?;
    }

    println!("Initialized tend repository at {}", path.display());
    for (file, _) in &files {
        println!("  Created: {}", file.display());
    }
    Ok(())
}

/// Read the node config and apply the run-list override.
fn load_node(args: &RepoArgs) -> Result<(NodeConfig, Vec<String>)> {
    let path = args.repo.join(&args.config);
    let node = if path.exists() {
        parser::parse_node_config_file(&path)?
    } else if !args.run_list.is_empty() {
        NodeConfig::default()
    } else {
        bail!("{} not found (pass --run-list to run without it)", path.display());
    };

    let items = if args.run_list.is_empty() {
        node.run_list.clone()
    } else {
        args.run_list.clone()
    };
    if items.is_empty() {
        bail!("run list is empty");
    }
    Ok((node, items))
}

fn cmd_validate(args: &RepoArgs) -> Result<()> {
    let (node, items) = load_node(args)?;
    let resources = runlist::load_resources(&args.repo, &node, &items)
        .with_context(|| format!("cannot load run list for {}", node.host))?;

    let errors = parser::validate(&resources);
    for id in parser::unnotified_deferred(&resources) {
        println!("  WARNING: deferred resource '{}' is never notified", id);
    }
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        bail!("{} validation error(s)", errors.len());
    }

    println!(
        "OK: {} ({} run-list item(s), {} resources)",
        node.host,
        items.len(),
        resources.len()
    );
    Ok(())
}

fn cmd_plan(args: &RepoArgs) -> Result<()> {
    let (node, items) = load_node(args)?;
    let list = runlist::load(&args.repo, &node, &items)
        .with_context(|| format!("cannot load run list for {}", node.host))?;

    println!("Plan: {} ({} resources)", node.host, list.len());
    println!();
    for (pos, r) in list.resources().iter().enumerate() {
        let marker = match r.action {
            Action::Run => "*",
            Action::Deferred => " ",
        };
        println!("  {} {:>3}. {} [{}]  ({})", marker, pos + 1, r.identifier, r.kind, r.origin);
        if let Some(ref guard) = r.guard {
            println!("         guard: {}", guard);
        }
        for edge in list.edges(pos) {
            println!(
                "         notifies: {} ({})",
                list.at(edge.target).identifier,
                edge.timing
            );
        }
    }

    let deferred = list
        .resources()
        .iter()
        .filter(|r| r.action == Action::Deferred)
        .count();
    println!();
    println!(
        "{} to run in order, {} deferred until notified.",
        list.len() - deferred,
        deferred
    );
    Ok(())
}

fn cmd_converge(
    args: &RepoArgs,
    failure: Option<FailurePolicy>,
    why_run: bool,
    state_dir: &Path,
    cancel: CancelToken,
) -> Result<()> {
    let (node, items) = load_node(args)?;
    let list = runlist::load(&args.repo, &node, &items)
        .with_context(|| format!("cannot load run list for {}", node.host))?;

    // A why-run changes nothing on the host, so it leaves no state behind
    let persist = !why_run;
    let config = EngineConfig {
        host: node.host.clone(),
        failure: failure.unwrap_or(node.policy.failure),
        cancel: Some(cancel.clone()),
        journal: (persist && node.policy.journal).then(|| Journal::new(state_dir, &node.host)),
    };

    let mut engine = Engine::new(LocalExecutor::new(why_run), config);
    let report = engine.converge(&list);

    print_report(&report);
    if persist && node.policy.save_report {
        let path = state::save_report(state_dir, &report).map_err(anyhow::Error::msg)?;
        tracing::debug!(path = %path.display(), "report saved");
    }
    if why_run {
        println!("Why-run: no changes applied.");
    }

    if !report.success {
        let failed = report.count(ResourceStatus::Failed);
        if cancel.is_cancelled() {
            bail!(
                "converge interrupted, {} resource(s) not run",
                report.untouched.len()
            );
        }
        if report.aborted {
            bail!("converge aborted with {} failed resource(s)", failed);
        }
        bail!("{} resource(s) failed", failed);
    }
    Ok(())
}

fn print_entry(entry: &ReportEntry) {
    println!(
        "  {:<8} {} [{}] ({:.2}s)",
        entry.status.to_string(),
        entry.identifier,
        entry.kind,
        entry.duration_seconds
    );
    if let Some(ref error) = entry.error {
        println!("           {}", error);
    }
}

fn print_report(report: &RunReport) {
    println!("Host: {} (run {})", report.host, report.run_id);
    println!("  Started:  {}", report.started_at);
    println!("  Finished: {}", report.finished_at);
    for entry in &report.entries {
        print_entry(entry);
    }
    for id in &report.untouched {
        println!("  {:<8} {}", "-", id);
    }
    println!();
    println!(
        "{}: {} executed, {} skipped, {} failed, {} untouched{}",
        if report.success { "Converged" } else { "Converge FAILED" },
        report.count(ResourceStatus::Executed),
        report.count(ResourceStatus::Skipped),
        report.count(ResourceStatus::Failed),
        report.untouched.len(),
        if report.aborted { " (aborted)" } else { "" }
    );
}

fn cmd_status(state_dir: &Path, host_filter: Option<&str>) -> Result<()> {
    if let Some(host) = host_filter {
        parser::validate_host(host)?;
        match state::load_report(state_dir, host).map_err(anyhow::Error::msg)? {
            Some(report) => print_report(&report),
            None => println!("No report for {}. Run `tend converge` first.", host),
        }
        return Ok(());
    }

    let entries = std::fs::read_dir(state_dir)
        .with_context(|| format!("cannot read state dir {}", state_dir.display()))?;
    let mut hosts: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    hosts.sort();

    let mut found = false;
    for host in hosts {
        if let Some(report) = state::load_report(state_dir, &host).map_err(anyhow::Error::msg)? {
            found = true;
            print_report(&report);
            println!();
        }
    }
    if !found {
        println!("No state found. Run `tend converge` first.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::JournalEvent;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn repo_args(root: &Path) -> RepoArgs {
        RepoArgs {
            repo: root.to_path_buf(),
            config: PathBuf::from("tend.yaml"),
            run_list: vec![],
        }
    }

    /// Repository whose resources touch files under `work`.
    fn fixture(root: &Path, work: &Path) {
        write(
            root,
            "tend.yaml",
            "host: test-host\nrun_list: ['role[archiver]']\n",
        );
        write(
            root,
            "roles/archiver.yaml",
            "name: archiver\nrun_list: ['recipe[python]']\n",
        );
        write(root, "cookbooks/python/files/virtualenv", "export WORKON_HOME=$HOME/.virtualenvs\n");
        write(
            root,
            "cookbooks/python/recipes/default.yaml",
            &format!(
                r#"
attributes:
  work: {work}
resources:
  - kind: execute
    id: make-home
    attributes:
      command: "mkdir -p {{{{node.work}}}}/home && echo made >> {{{{node.work}}}}/log"
    guard:
      not_if:
        file_exists: "{{{{node.work}}}}/home"
    notifies:
      - target: reload
        timing: delayed
  - kind: cookbook_file
    id: "{work}/home/virtualenv"
    attributes:
      source: virtualenv
      mode: "0644"
  - kind: execute
    id: reload
    action: deferred
    attributes:
      command: "echo reloaded >> {{{{node.work}}}}/log"
"#,
                work = work.display()
            ),
        );
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("site");
        std::fs::create_dir_all(&sub).unwrap();
        cmd_init(&sub).unwrap();
        assert!(sub.join("tend.yaml").exists());
        assert!(sub.join("roles/base.yaml").exists());
        assert!(sub.join("cookbooks/example/recipes/default.yaml").exists());
        assert!(sub.join("state").is_dir());

        // The scaffold loads cleanly
        cmd_validate(&repo_args(&sub)).unwrap();
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tend.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_validate_ok() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path(), &dir.path().join("work"));
        cmd_validate(&repo_args(dir.path())).unwrap();
    }

    #[test]
    fn test_validate_reports_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tend.yaml", "run_list: ['recipe[broken]']\n");
        write(
            dir.path(),
            "cookbooks/broken/recipes/default.yaml",
            r#"
resources:
  - {kind: package, id: curl, notifies: [{target: ghost}]}
  - {kind: package, id: curl}
"#,
        );
        let err = cmd_validate(&repo_args(dir.path())).unwrap_err();
        assert_eq!(err.to_string(), "2 validation error(s)");
    }

    #[test]
    fn test_validate_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_validate(&repo_args(dir.path())).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_run_list_override_without_config() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "cookbooks/base/recipes/default.yaml",
            "resources: [{kind: package, id: curl}]",
        );
        let mut args = repo_args(dir.path());
        args.run_list = vec!["recipe[base]".to_string()];
        let (node, items) = load_node(&args).unwrap();
        assert_eq!(node.host, "localhost");
        assert_eq!(items, vec!["recipe[base]"]);
        cmd_plan(&args).unwrap();
    }

    #[test]
    fn test_plan() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path(), &dir.path().join("work"));
        cmd_plan(&repo_args(dir.path())).unwrap();
        assert!(!dir.path().join("work").exists());
    }

    #[test]
    fn test_plan_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tend.yaml", "run_list: ['role[missing]']\n");
        let err = cmd_plan(&repo_args(dir.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("missing"));
    }

    #[test]
    fn test_converge_then_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let state_dir = dir.path().join("state");
        fixture(dir.path(), &work);
        let args = repo_args(dir.path());

        cmd_converge(&args, None, false, &state_dir, CancelToken::new()).unwrap();
        assert!(work.join("home/virtualenv").exists());
        assert_eq!(
            std::fs::read_to_string(work.join("log")).unwrap(),
            "made\nreloaded\n"
        );
        let first = state::load_report(&state_dir, "test-host").unwrap().unwrap();
        assert_eq!(first.count(ResourceStatus::Executed), 3);
        assert!(state_dir.join("test-host/events.jsonl").exists());

        cmd_converge(&args, None, false, &state_dir, CancelToken::new()).unwrap();
        let second = state::load_report(&state_dir, "test-host").unwrap().unwrap();
        assert_eq!(second.count(ResourceStatus::Skipped), 1);
        // Nothing notified the deferred resource this time
        assert_eq!(second.untouched, vec!["reload"]);
        assert_eq!(
            std::fs::read_to_string(work.join("log")).unwrap(),
            "made\nreloaded\n"
        );
    }

    #[test]
    fn test_converge_why_run() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let state_dir = dir.path().join("state");
        fixture(dir.path(), &work);

        cmd_converge(&repo_args(dir.path()), None, true, &state_dir, CancelToken::new()).unwrap();
        assert!(!work.exists());
        assert!(!state_dir.exists());
    }

    #[test]
    fn test_converge_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        write(dir.path(), "tend.yaml", "host: h\nrun_list: ['recipe[fail]']\n");
        write(
            dir.path(),
            "cookbooks/fail/recipes/default.yaml",
            "resources: [{kind: execute, id: 'exit 4'}, {kind: execute, id: 'true'}]",
        );
        let args = repo_args(dir.path());

        let err = cmd_converge(&args, None, false, &state_dir, CancelToken::new()).unwrap_err();
        assert_eq!(err.to_string(), "1 resource(s) failed");
        let report = state::load_report(&state_dir, "h").unwrap().unwrap();
        assert_eq!(report.count(ResourceStatus::Executed), 1);

        let err =
            cmd_converge(
                &args,
                Some(FailurePolicy::StopOnFirst),
                false,
                &state_dir,
                CancelToken::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("aborted"));
        let report = state::load_report(&state_dir, "h").unwrap().unwrap();
        assert_eq!(report.untouched, vec!["true"]);
    }

    #[test]
    fn test_converge_interrupted_saves_report() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let state_dir = dir.path().join("state");
        fixture(dir.path(), &work);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err =
            cmd_converge(&repo_args(dir.path()), None, false, &state_dir, cancel).unwrap_err();
        assert!(err.to_string().contains("interrupted"), "{}", err);
        assert!(!work.exists());

        let report = state::load_report(&state_dir, "test-host").unwrap().unwrap();
        assert!(report.aborted);
        assert!(!report.success);
        assert!(report.entries.is_empty());
        assert_eq!(report.untouched.len(), 3);

        let events = crate::journal::eventlog::read_events(&state_dir, "test-host").unwrap();
        assert!(matches!(
            events.last().map(|e| &e.event),
            Some(JournalEvent::ConvergeCompleted { .. })
        ));
    }

    #[test]
    fn test_status() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&state_dir).unwrap();
        cmd_status(&state_dir, None).unwrap();
        cmd_status(&state_dir, Some("nobody")).unwrap();

        fixture(dir.path(), &dir.path().join("work"));
        cmd_converge(&repo_args(dir.path()), None, false, &state_dir, CancelToken::new()).unwrap();
        cmd_status(&state_dir, None).unwrap();
        cmd_status(&state_dir, Some("test-host")).unwrap();
    }

    #[test]
    fn test_status_rejects_escaping_host() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_status(dir.path(), Some("../etc")).unwrap_err();
        assert!(err.to_string().contains("invalid host name"), "{}", err);
    }

    #[test]
    fn test_status_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_status(&dir.path().join("nope"), None).is_err());
    }

    #[test]
    fn test_dispatch_init() {
        let dir = tempfile::tempdir().unwrap();
        dispatch(Commands::Init {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        assert!(dir.path().join("tend.yaml").exists());
    }
}
