//! The process registry: the authoritative collection of managed
//! processes, keyed by unique name.
//!
//! Concurrency contract: one exclusive lock per registry instance covers
//! every structural (add/remove) and lifecycle (start/stop) operation on
//! any record it owns. HTTP handlers, the interactive loop, and fired
//! deferred-launch timers all contend for this same lock; at most one
//! operation is in flight at a time. Lock-hold time includes the spawn or
//! kill syscall and the synchronous persist write.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use runnerd_core::{Error, Result};

use crate::record::{LaunchMode, ProcessRecord, ProcessSnapshot, RunState};
use crate::store::StateStore;

pub struct ProcessRegistry {
    inner: Mutex<RegistryInner>,
}

pub(crate) struct RegistryInner {
    pub(crate) records: HashMap<String, ProcessRecord>,
    pub(crate) store: StateStore,
}

impl ProcessRegistry {
    pub fn new(store: StateStore) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                records: HashMap::new(),
                store,
            }),
        }
    }

    /// A poisoned lock only means another operation panicked mid-flight;
    /// the map itself is still usable, so keep going.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load every persisted record from disk into the registry. Called
    /// once at startup, before any front end is wired up. Returns the
    /// number of records loaded.
    pub fn load_from_disk(&self) -> Result<usize> {
        let inner = &mut *self.lock();
        let records = inner.store.load_all_records()?;
        let count = records.len();
        for record in records {
            inner.records.insert(record.name.clone(), record);
        }
        if count > 0 {
            tracing::info!(count, "loaded processes from disk");
        }
        Ok(count)
    }

    /// Register a new process. The record is persisted before it becomes
    /// visible to any other caller.
    pub fn add(&self, name: &str, path: &str, mode: LaunchMode) -> Result<ProcessSnapshot> {
        let inner = &mut *self.lock();
        if inner.records.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let mut record = ProcessRecord::new(name, path, mode);
        inner.store.save_record(&record)?;
        let snapshot = record.snapshot();
        inner.records.insert(name.to_string(), record);
        tracing::info!(name, path, %mode, "process added");
        Ok(snapshot)
    }

    pub fn get(&self, name: &str) -> Result<ProcessSnapshot> {
        let inner = &mut *self.lock();
        inner
            .records
            .get_mut(name)
            .map(|r| r.snapshot())
            .ok_or_else(|| Error::process_not_found(name))
    }

    /// Snapshot sequence of all records, safe to iterate without holding
    /// the registry lock for the duration.
    pub fn list(&self) -> Vec<ProcessSnapshot> {
        let inner = &mut *self.lock();
        let mut all: Vec<_> = inner.records.values_mut().map(|r| r.snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Start a manually-controlled process. Scheduled records only start
    /// through the scheduler path.
    pub fn start(&self, name: &str, args: &[String]) -> Result<u32> {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::process_not_found(name))?;
        if record.mode == LaunchMode::Scheduled {
            return Err(Error::ScheduledProcess(name.to_string()));
        }
        record.launch(args, store)
    }

    /// Stop a running process. Idempotent against a child that already
    /// exited on its own: that reconciles to `Stopped` and succeeds.
    pub fn stop(&self, name: &str) -> Result<()> {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::process_not_found(name))?;
        record.terminate(store)
    }

    /// Human-readable status, probing the OS for a crashed child without
    /// correcting the stored state.
    pub fn status(&self, name: &str) -> Result<String> {
        let inner = &mut *self.lock();
        inner
            .records
            .get_mut(name)
            .map(|r| r.reported_status().to_string())
            .ok_or_else(|| Error::process_not_found(name))
    }

    /// Unregister a process and delete its persisted artifacts. Non-fatal
    /// failures along the way (stop failure, missing artifact) are logged
    /// and removal proceeds to completion.
    pub fn remove(&self, name: &str) -> Result<()> {
        let inner = &mut *self.lock();
        let RegistryInner { records, store } = inner;
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::process_not_found(name))?;

        if let Some(armed) = record.armed.take() {
            armed.abort();
            tracing::info!(name, "cancelled pending deferred launch");
        }

        if matches!(record.state, RunState::Running { .. }) {
            if let Err(e) = record.terminate(store) {
                tracing::error!(name, error = %e, "failed to stop process during removal, continuing");
            }
        }

        if let Err(e) = store.delete_record(name) {
            tracing::error!(name, error = %e, "failed to delete process state file");
        }
        if record.mode == LaunchMode::Scheduled {
            if let Err(e) = store.delete_artifact(name) {
                tracing::error!(name, error = %e, "failed to delete job artifact");
            }
        }

        records.remove(name);
        tracing::info!(name, "process removed");
        Ok(())
    }
}
