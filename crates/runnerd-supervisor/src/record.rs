//! The process record: one managed executable's declarative definition
//! plus its last known runtime status.
//!
//! Lifecycle transitions live here as crate-private methods. They are only
//! ever called by [`crate::registry::ProcessRegistry`] with the registry
//! lock already held, so they never take a lock themselves.

use std::process::{Child, Command};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use runnerd_core::{Error, Result};

use crate::schedule::TimingRule;
use crate::store::StateStore;

/// Whether a process may be launched by direct operator request or only
/// through the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Manual,
    Scheduled,
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Scheduled => f.write_str("scheduled"),
        }
    }
}

impl std::str::FromStr for LaunchMode {
    type Err = runnerd_core::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" | "0" => Ok(Self::Manual),
            "scheduled" | "auto" | "1" => Ok(Self::Scheduled),
            other => Err(Error::Config(format!(
                "invalid mode '{other}': must be 'manual' or 'scheduled'"
            ))),
        }
    }
}

/// Run state as a tagged sum: the pid exists if and only if the process
/// is running. Serializes as `{"status":"stopped"}` or
/// `{"status":"running","pid":N}` when flattened into the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running { pid: u32 },
}

/// One managed process: definition, runtime status, and the in-memory
/// handles that never hit disk (the spawned child, the armed timer).
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,
    pub path: String,
    pub mode: LaunchMode,
    #[serde(flatten)]
    pub state: RunState,
    /// Attached timing rule, present once a job has been assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingRule>,
    /// Tombstone set when the job was deleted after a deferred launch was
    /// already armed, so a straggling fire becomes a no-op.
    #[serde(default)]
    pub job_deleted: bool,
    /// Handle to the spawned OS process, held while running.
    #[serde(skip)]
    pub(crate) child: Option<Child>,
    /// Abort handle for a pending deferred launch.
    #[serde(skip)]
    pub(crate) armed: Option<AbortHandle>,
}

impl ProcessRecord {
    pub(crate) fn new(name: &str, path: &str, mode: LaunchMode) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            mode,
            state: RunState::Stopped,
            timing: None,
            job_deleted: false,
            child: None,
            armed: None,
        }
    }

    /// Spawn the executable and move to `Running`. Shared by the manual
    /// start path and the scheduler's fire path; the mode guard lives in
    /// the registry's manual entry point.
    ///
    /// The in-memory transition takes effect before the persist write, so
    /// an `Io` error here means "started, durability uncertain".
    pub(crate) fn launch(&mut self, args: &[String], store: &StateStore) -> Result<u32> {
        if let RunState::Running { pid } = self.state {
            return Err(Error::AlreadyRunning {
                name: self.name.clone(),
                pid,
            });
        }

        let child = Command::new(&self.path)
            .args(args)
            .spawn()
            .map_err(|e| Error::Launch {
                name: self.name.clone(),
                source: e,
            })?;

        let pid = child.id();
        self.child = Some(child);
        self.state = RunState::Running { pid };
        tracing::info!(name = %self.name, pid, "process started");

        store.save_record(self)?;
        Ok(pid)
    }

    /// Terminate the running process and move to `Stopped`.
    ///
    /// A child that already exited on its own is treated as already
    /// stopped: the record is reconciled and the call succeeds. Exit-wait
    /// errors after a successful kill are swallowed.
    pub(crate) fn terminate(&mut self, store: &StateStore) -> Result<()> {
        let RunState::Running { pid } = self.state else {
            return Err(Error::NotRunning(self.name.clone()));
        };

        match self.child.as_mut() {
            Some(child) => {
                // Exited on its own? Reconcile instead of erroring.
                if !matches!(child.try_wait(), Ok(None)) {
                    tracing::warn!(
                        name = %self.name,
                        pid,
                        "process already exited, reconciling state"
                    );
                    return self.mark_stopped(store);
                }

                if let Err(e) = child.kill() {
                    return Err(Error::Termination {
                        name: self.name.clone(),
                        source: e,
                    });
                }
                // Reap the child; wait errors are not surfaced.
                let _ = child.wait();
                tracing::info!(name = %self.name, pid, "process stopped");
                self.mark_stopped(store)
            }
            // No handle to resolve (should not happen in-memory): the
            // process is gone as far as we can tell.
            None => {
                tracing::warn!(name = %self.name, pid, "no child handle, marking stopped");
                self.mark_stopped(store)
            }
        }
    }

    fn mark_stopped(&mut self, store: &StateStore) -> Result<()> {
        self.child = None;
        self.state = RunState::Stopped;
        store.save_record(self)?;
        Ok(())
    }

    /// Human-readable status. When the stored state says running, the held
    /// child handle is probed: a child the OS no longer recognizes reports
    /// "stopped (crashed)" WITHOUT correcting the stored state. Callers
    /// that need ground truth reconcile via the idempotent stop.
    pub(crate) fn reported_status(&mut self) -> &'static str {
        match self.state {
            RunState::Stopped => "stopped",
            RunState::Running { .. } => match self.child.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(None) => "running",
                    // Exited or unqueryable: the OS process is gone.
                    Ok(Some(_)) | Err(_) => "stopped (crashed)",
                },
                None => "running",
            },
        }
    }

    /// Read-only copy safe to hand out past the registry lock.
    pub(crate) fn snapshot(&mut self) -> ProcessSnapshot {
        let status = self.reported_status().to_string();
        ProcessSnapshot {
            name: self.name.clone(),
            path: self.path.clone(),
            mode: self.mode,
            status,
            pid: match self.state {
                RunState::Running { pid } => Some(pid),
                RunState::Stopped => None,
            },
            trigger_time: self.timing.as_ref().map(|t| t.trigger_time),
        }
    }
}

/// Read-only view of a record, detached from the registry lock.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub path: String,
    pub mode: LaunchMode,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_time: Option<DateTime<Utc>>,
}
