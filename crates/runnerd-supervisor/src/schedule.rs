//! Timing rules and the one-shot job scheduler.
//!
//! A timing rule is a named, immutable trigger time persisted on its own.
//! Assigning a rule to a scheduled record and arming the deferred launch
//! both happen under the registry lock, and a fired timer re-enters
//! through that same lock, so a launch never races a deletion: deletion
//! aborts the armed timer synchronously, and a straggler that already
//! passed its sleep re-resolves the record by name and finds it gone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runnerd_core::{Error, Result};

use crate::record::{LaunchMode, RunState};
use crate::registry::{ProcessRegistry, RegistryInner};

/// A named, immutable trigger-time definition. Created once, referenced
/// by zero or more records, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRule {
    pub name: String,
    pub trigger_time: DateTime<Utc>,
}

/// Persisted snapshot of an assigned job, written next to the rules so
/// `remove`/`delete_job` have a concrete artifact to erase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobArtifact {
    pub process: String,
    pub rule: String,
    pub trigger_time: DateTime<Utc>,
}

/// Parse a trigger-time input: integer epoch seconds first, RFC1123
/// timestamp string second.
fn parse_trigger_time(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(epoch) = input.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| Error::InvalidTimeFormat(input.to_string()));
    }
    DateTime::parse_from_rfc2822(input)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimeFormat(input.to_string()))
}

impl ProcessRegistry {
    /// Create and persist a new timing rule.
    pub fn create_timing_rule(&self, name: &str, input: &str) -> Result<TimingRule> {
        let trigger_time = parse_trigger_time(input)?;
        let inner = &*self.lock();
        if inner.store.rule_exists(name) {
            return Err(Error::DuplicateRule(name.to_string()));
        }
        let rule = TimingRule {
            name: name.to_string(),
            trigger_time,
        };
        inner.store.save_rule(&rule)?;
        tracing::info!(name, at = %rule.trigger_time.to_rfc2822(), "timing rule created");
        Ok(rule)
    }

    /// Attach a persisted timing rule to a scheduled record.
    pub fn assign_job(&self, process: &str, rule_name: &str) -> Result<()> {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let record = records
            .get_mut(process)
            .ok_or_else(|| Error::process_not_found(process))?;
        if record.mode != LaunchMode::Scheduled {
            return Err(Error::NotSchedulable(process.to_string()));
        }

        let rule = store.load_rule(rule_name)?;
        store.save_artifact(&JobArtifact {
            process: process.to_string(),
            rule: rule.name.clone(),
            trigger_time: rule.trigger_time,
        })?;
        tracing::info!(process, rule = rule_name, at = %rule.trigger_time.to_rfc2822(), "job assigned");
        record.timing = Some(rule);
        store.save_record(record)
    }

    /// Start a scheduled record according to its attached rule.
    ///
    /// A future trigger arms a one-shot deferred launch and returns
    /// immediately; the fired timer contends for the registry lock like
    /// any direct caller. A trigger already in the past launches
    /// synchronously. Already running is a no-op success.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_job(self: Arc<Self>, name: &str) -> Result<()> {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::process_not_found(name))?;

        if matches!(record.state, RunState::Running { .. }) {
            tracing::warn!(name, "cannot start job, process is already running");
            return Ok(());
        }
        let Some(timing) = record.timing.as_ref() else {
            return Err(Error::NoTimingConfigured(name.to_string()));
        };

        let now = Utc::now();
        let at = timing.trigger_time;
        if now < at {
            let delay = (at - now).to_std().unwrap_or_default();
            tracing::info!(name, wait = ?delay, "job scheduled for the future, arming deferred launch");

            let registry = Arc::clone(&self);
            let process = name.to_string();
            let task = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                registry.run_due_job(&process);
            });
            record.armed = Some(task.abort_handle());
            return Ok(());
        }

        tracing::info!(name, "job schedule is in the past, starting immediately");
        record.launch(&[], store).map(|_| ())
    }

    /// Fire path of a deferred launch. Re-resolves the record by name
    /// under the lock; a record removed in the meantime is a no-op.
    fn run_due_job(&self, name: &str) {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let Some(record) = records.get_mut(name) else {
            tracing::debug!(name, "deferred launch fired for a removed process, ignoring");
            return;
        };
        record.armed = None;
        if record.job_deleted {
            tracing::info!(name, "job was deleted before it could run");
            return;
        }

        tracing::info!(name, "scheduled time reached, starting process");
        match record.launch(&[], store) {
            Ok(pid) => tracing::info!(name, pid, "scheduled process started"),
            Err(e) => tracing::error!(name, error = %e, "failed to auto-start scheduled process"),
        }
    }

    /// Delete a record's job: cancel any armed deferred launch, stop the
    /// process if running, and erase the record with its artifacts.
    ///
    /// The abort happens under the registry lock, so after this returns
    /// no launch can occur. The `job_deleted` tombstone is still set as a
    /// second guard for a fire already past its sleep.
    pub fn delete_job(&self, name: &str) -> Result<()> {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::process_not_found(name))?;

        if let Some(armed) = record.armed.take() {
            armed.abort();
            tracing::info!(name, "cancelled armed deferred launch");
        }
        record.job_deleted = true;

        if matches!(record.state, RunState::Running { .. }) {
            if let Err(e) = record.terminate(store) {
                tracing::error!(name, error = %e, "failed to stop process during job deletion, continuing");
            }
        }

        if let Err(e) = store.delete_record(name) {
            tracing::error!(name, error = %e, "failed to delete process state file");
        }
        if let Err(e) = store.delete_artifact(name) {
            tracing::error!(name, error = %e, "failed to delete job artifact");
        }

        records.remove(name);
        tracing::info!(name, "job deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::scratch_registry;
    use chrono::TimeZone;
    use std::path::Path;
    use std::time::Duration;

    /// Scheduled launches run with no arguments, so give them a script
    /// that stays alive on its own.
    fn sleeper_script(base: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(base).unwrap();
        let path = base.join("sleeper.sh");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_epoch_and_rfc1123() {
        let t = parse_trigger_time("1700000000").unwrap();
        assert_eq!(t, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let t = parse_trigger_time("Tue, 14 Nov 2023 22:13:20 GMT").unwrap();
        assert_eq!(t, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        assert!(matches!(
            parse_trigger_time("next tuesday").unwrap_err(),
            Error::InvalidTimeFormat(_)
        ));
    }

    #[test]
    fn test_duplicate_rule_is_rejected() {
        let (registry, base) = scratch_registry("runnerd-test-sched-dup");
        registry.create_timing_rule("r1", "1700000000").unwrap();
        let err = registry
            .create_timing_rule("r1", "Tue, 14 Nov 2023 22:13:20 GMT")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRule(_)));
        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn test_assign_job_mode_guard() {
        let (registry, base) = scratch_registry("runnerd-test-sched-guard");
        registry.create_timing_rule("r1", "1700000000").unwrap();
        registry.add("manual", "/bin/true", LaunchMode::Manual).unwrap();
        let err = registry.assign_job("manual", "r1").unwrap_err();
        assert!(matches!(err, Error::NotSchedulable(_)));
        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn test_assign_job_attaches_rule() {
        let (registry, base) = scratch_registry("runnerd-test-sched-assign");
        let rule = registry.create_timing_rule("r1", "1700000000").unwrap();
        registry
            .add("nightly", "/bin/true", LaunchMode::Scheduled)
            .unwrap();
        registry.assign_job("nightly", "r1").unwrap();

        let snap = registry.get("nightly").unwrap();
        assert_eq!(snap.trigger_time, Some(rule.trigger_time));
        // The assigned-job artifact is persisted alongside the rules.
        assert!(base.join("sched").join("nightly.json").exists());

        let err = registry.assign_job("nightly", "ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_start_job_requires_timing() {
        let (registry, base) = scratch_registry("runnerd-test-sched-notiming");
        let registry = Arc::new(registry);
        registry
            .add("nightly", "/bin/true", LaunchMode::Scheduled)
            .unwrap();
        let err = Arc::clone(&registry).start_job("nightly").unwrap_err();
        assert!(matches!(err, Error::NoTimingConfigured(_)));
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_past_due_job_starts_immediately() {
        let (registry, base) = scratch_registry("runnerd-test-sched-past");
        let registry = Arc::new(registry);
        let script = sleeper_script(&base);
        registry.create_timing_rule("past", "1700000000").unwrap();
        registry.add("sleeper", &script, LaunchMode::Scheduled).unwrap();
        registry.assign_job("sleeper", "past").unwrap();

        Arc::clone(&registry).start_job("sleeper").unwrap();
        assert_eq!(registry.status("sleeper").unwrap(), "running");

        // Already running: a second start_job is a no-op success.
        Arc::clone(&registry).start_job("sleeper").unwrap();

        registry.stop("sleeper").unwrap();
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_deferred_launch_fires() {
        let (registry, base) = scratch_registry("runnerd-test-sched-fire");
        let registry = Arc::new(registry);
        let at = (Utc::now() + chrono::Duration::seconds(1)).timestamp();
        let script = sleeper_script(&base);
        registry.create_timing_rule("soon", &at.to_string()).unwrap();
        registry.add("sleeper", &script, LaunchMode::Scheduled).unwrap();
        registry.assign_job("sleeper", "soon").unwrap();

        Arc::clone(&registry).start_job("sleeper").unwrap();
        // Returns immediately, still stopped before the trigger.
        assert_eq!(registry.status("sleeper").unwrap(), "stopped");

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(registry.status("sleeper").unwrap(), "running");

        registry.stop("sleeper").unwrap();
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_delete_job_cancels_deferred_launch() {
        let (registry, base) = scratch_registry("runnerd-test-sched-cancel");
        let registry = Arc::new(registry);
        let at = (Utc::now() + chrono::Duration::seconds(1)).timestamp();
        let script = sleeper_script(&base);
        registry.create_timing_rule("soon", &at.to_string()).unwrap();
        registry.add("sleeper", &script, LaunchMode::Scheduled).unwrap();
        registry.assign_job("sleeper", "soon").unwrap();

        Arc::clone(&registry).start_job("sleeper").unwrap();
        registry.delete_job("sleeper").unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        // The record is gone and nothing was launched on its behalf.
        assert!(matches!(
            registry.get("sleeper").unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(!base.join("data").join("processes").join("sleeper.json").exists());
        assert!(!base.join("sched").join("sleeper.json").exists());
        std::fs::remove_dir_all(&base).ok();
    }
}
