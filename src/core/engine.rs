//! Convergence engine: one pass over the run list.
//!
//! Resources are walked in declared order. Each `run` resource still pending
//! is guarded, executed and then delivers its notifications: `immediate`
//! targets are applied on the spot, `delayed` targets go to a run-wide queue
//! drained after the walk. Every resource leaves `pending` at most once.
//!
//! Execution errors never escape: `converge` always returns a `RunReport`.

use super::guard;
use super::notify::NotificationQueue;
use super::runlist::RunList;
use super::types::*;
use crate::journal::{digest, eventlog, Journal};
use crate::transport::Executor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared stop flag, checked before each resource is evaluated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl From<Arc<AtomicBool>> for CancelToken {
    fn from(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }
}

/// Engine settings for one host.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub failure: FailurePolicy,
    pub cancel: Option<CancelToken>,
    pub journal: Option<Journal>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            failure: FailurePolicy::default(),
            cancel: None,
            journal: None,
        }
    }
}

/// Drives an `Executor` over run lists.
pub struct Engine<E> {
    executor: E,
    config: EngineConfig,
}

impl<E: Executor> Engine<E> {
    pub fn new(executor: E, config: EngineConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Converge the host toward `list`.
    pub fn converge(&mut self, list: &RunList) -> RunReport {
        let run_id = eventlog::generate_run_id();
        let started_at = eventlog::now_iso8601();
        let start = Instant::now();
        let host = self.config.host.clone();

        tracing::info!(host = %host, run_id = %run_id, resources = list.len(), "converge started");
        if let Some(ref journal) = self.config.journal {
            journal.record(JournalEvent::ConvergeStarted {
                host: host.clone(),
                run_id: run_id.clone(),
                run_list_digest: digest::run_list_digest(list),
                resources: list.len(),
            });
        }

        let mut run = Run {
            list,
            executor: &mut self.executor,
            config: &self.config,
            statuses: vec![ResourceStatus::Pending; list.len()],
            entries: Vec::with_capacity(list.len()),
            queue: NotificationQueue::new(),
            halted: false,
        };
        run.walk();
        run.drain_delayed();

        let untouched: Vec<String> = run
            .statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ResourceStatus::Pending)
            .map(|(pos, _)| list.at(pos).identifier.clone())
            .collect();
        let aborted = run.halted;
        let entries = run.entries;

        let report = RunReport {
            host: host.clone(),
            run_id: run_id.clone(),
            started_at,
            finished_at: eventlog::now_iso8601(),
            success: !aborted && !entries.iter().any(|e| e.status == ResourceStatus::Failed),
            entries,
            untouched,
            aborted,
        };

        let executed = report.count(ResourceStatus::Executed);
        let skipped = report.count(ResourceStatus::Skipped);
        let failed = report.count(ResourceStatus::Failed);
        let total_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            host = %host,
            run_id = %run_id,
            executed,
            skipped,
            failed,
            untouched = report.untouched.len(),
            aborted,
            "converge finished"
        );
        if let Some(ref journal) = self.config.journal {
            journal.record(JournalEvent::ConvergeCompleted {
                host,
                run_id,
                executed,
                skipped,
                failed,
                aborted,
                total_seconds,
            });
        }

        report
    }
}

/// Mutable state of one converge.
struct Run<'a, E: ?Sized> {
    list: &'a RunList,
    executor: &'a mut E,
    config: &'a EngineConfig,
    statuses: Vec<ResourceStatus>,
    entries: Vec<ReportEntry>,
    queue: NotificationQueue<usize>,
    halted: bool,
}

impl<E: Executor + ?Sized> Run<'_, E> {
    fn walk(&mut self) {
        for pos in 0..self.list.len() {
            if self.halted {
                return;
            }
            if self.list.at(pos).action == Action::Deferred {
                continue;
            }
            self.apply(pos);
        }
    }

    /// Run queued targets until nothing new is notified.
    fn drain_delayed(&mut self) {
        while !self.halted {
            let batch = self.queue.drain();
            if batch.is_empty() {
                return;
            }
            for pos in batch {
                if self.halted {
                    return;
                }
                self.apply(pos);
            }
        }
    }

    /// Guard, execute and notify for the resource at `pos`.
    fn apply(&mut self, pos: usize) {
        if self.halted || self.statuses[pos] != ResourceStatus::Pending {
            return;
        }
        if self.config.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            tracing::warn!(host = %self.config.host, "converge cancelled");
            self.halted = true;
            return;
        }

        let list = self.list;
        let resource = list.at(pos);
        let started = Instant::now();

        let skip = match guard::should_skip(resource, &mut *self.executor) {
            Ok(skip) => skip,
            Err(e) => {
                tracing::warn!(resource = %resource.identifier, error = %e, "guard probe failed, running action");
                self.journal(JournalEvent::ProbeFailed {
                    host: self.config.host.clone(),
                    resource: resource.identifier.clone(),
                    error: e.message,
                });
                false
            }
        };

        if skip {
            let reason = resource
                .guard
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            tracing::info!(resource = %resource.identifier, guard = %reason, "skipped");
            self.finish(pos, ResourceStatus::Skipped, None, None, started);
            self.journal(JournalEvent::ResourceSkipped {
                host: self.config.host.clone(),
                resource: resource.identifier.clone(),
                guard: reason,
            });
            return;
        }

        match self.executor.execute(resource.kind, &resource.attributes) {
            Ok(output) => {
                let duration = started.elapsed().as_secs_f64();
                tracing::info!(resource = %resource.identifier, kind = %resource.kind, duration, "executed");
                self.finish(pos, ResourceStatus::Executed, Some(output), None, started);
                self.journal(JournalEvent::ResourceExecuted {
                    host: self.config.host.clone(),
                    resource: resource.identifier.clone(),
                    duration_seconds: duration,
                });
                self.notify(pos);
            }
            Err(e) => {
                tracing::error!(resource = %resource.identifier, kind = %resource.kind, error = %e, "failed");
                self.finish(pos, ResourceStatus::Failed, None, Some(e.message.clone()), started);
                self.journal(JournalEvent::ResourceFailed {
                    host: self.config.host.clone(),
                    resource: resource.identifier.clone(),
                    error: e.message,
                });
                if self.config.failure == FailurePolicy::StopOnFirst {
                    tracing::warn!(resource = %resource.identifier, "stopping at first failure");
                    self.halted = true;
                }
            }
        }
    }

    /// Deliver notifications of an executed resource.
    fn notify(&mut self, pos: usize) {
        let list = self.list;
        let source = &list.at(pos).identifier;
        let edges = list.edges(pos);

        for edge in edges.iter().filter(|e| e.timing == Timing::Immediate) {
            tracing::debug!(from = %source, to = %list.at(edge.target).identifier, "immediate notification");
            self.apply(edge.target);
        }
        for edge in edges.iter().filter(|e| e.timing == Timing::Delayed) {
            if self.queue.enqueue(edge.target) {
                tracing::debug!(from = %source, to = %list.at(edge.target).identifier, "delayed notification queued");
            }
        }
    }

    fn finish(
        &mut self,
        pos: usize,
        status: ResourceStatus,
        output: Option<String>,
        error: Option<String>,
        started: Instant,
    ) {
        let resource = self.list.at(pos);
        self.statuses[pos] = status;
        self.entries.push(ReportEntry {
            identifier: resource.identifier.clone(),
            kind: resource.kind,
            status,
            error,
            output,
            duration_seconds: started.elapsed().as_secs_f64(),
        });
    }

    fn journal(&self, event: JournalEvent) {
        if let Some(ref journal) = self.config.journal {
            journal.record(event);
        }
    }
}
