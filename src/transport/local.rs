//! Local execution: generated scripts piped to `bash` on this host.

use super::{ExecOutput, Executor};
use crate::core::attributes::Attributes;
use crate::core::codegen;
use crate::core::error::{ExecutionError, ProbeError};
use crate::core::types::{Predicate, ResourceKind};
use std::io::Write;
use std::process::{Command, Stdio};

/// Execute a shell script locally via `bash`.
/// Uses bash (not sh/dash) because generated scripts use `set -o pipefail`.
pub fn exec_local(script: &str) -> Result<ExecOutput, String> {
    let mut child = Command::new("bash")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn bash: {}", e))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| format!("stdin write error: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Executor for the host tend runs on.
///
/// In why-run mode probes still run for real (they are read-only) but
/// actions are only described.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    why_run: bool,
}

impl LocalExecutor {
    pub fn new(why_run: bool) -> Self {
        Self { why_run }
    }

    pub fn why_run(&self) -> bool {
        self.why_run
    }
}

impl Executor for LocalExecutor {
    fn execute(
        &mut self,
        kind: ResourceKind,
        attributes: &Attributes,
    ) -> Result<String, ExecutionError> {
        let script = codegen::apply_script(kind, attributes)?;
        if self.why_run {
            let line = format!("why-run: would {}", describe(kind, attributes));
            tracing::info!(%kind, "{}", line);
            return Ok(line);
        }

        let out = exec_local(&script).map_err(ExecutionError::new)?;
        if !out.success() {
            return Err(ExecutionError::new(format!(
                "exit code {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }

    fn probe(&mut self, predicate: &Predicate) -> Result<bool, ProbeError> {
        let out = exec_local(&codegen::probe_script(predicate)).map_err(ProbeError::new)?;
        match (predicate, out.exit_code) {
            (_, 0) => Ok(true),
            (Predicate::CommandSucceeds(_), _) | (_, 1) => Ok(false),
            (_, code) => Err(ProbeError::new(format!(
                "{} exited {}: {}",
                predicate,
                code,
                out.stderr.trim()
            ))),
        }
    }
}

/// One-line summary of an action for why-run output.
fn describe(kind: ResourceKind, attrs: &Attributes) -> String {
    let attr = |key: &str| attrs.get(key).unwrap_or_default();
    match kind {
        ResourceKind::Execute => {
            let first = attr("command").lines().next().unwrap_or_default();
            format!("execute '{}'", first)
        }
        ResourceKind::Package => match attrs.get("version") {
            Some(v) => format!("install package {}={}", attr("package_name"), v),
            None => format!("install package {}", attr("package_name")),
        },
        ResourceKind::CookbookFile => {
            format!("deploy {} from {}", attr("path"), attr("source"))
        }
    }
}
