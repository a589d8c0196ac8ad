//! Job identifiers and the registry of jobs currently being written.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Opaque identifier naming one conversion's artifacts.
///
/// A random UUIDv4, so identifiers carry no ordering information and cannot
/// be enumerated. Its text form is the only thing ever written to disk, as a
/// path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    /// Parse the text form. Anything that is not a UUID yields `None`, which
    /// also keeps path separators and `..` out of storage paths.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(JobId)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// Set of jobs whose artifacts are still being written.
///
/// The sweeper consults it before deleting anything, so a slow conversion is
/// never reaped halfway through even if it outlives the retention threshold.
/// Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct InFlightJobs {
    inner: Arc<Mutex<HashSet<JobId>>>,
}

impl InFlightJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` until the returned guard is dropped.
    pub fn register(&self, id: JobId) -> InFlightGuard {
        self.lock().insert(id);
        InFlightGuard {
            jobs: self.clone(),
            id,
        }
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<JobId>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its job from [`InFlightJobs`] on drop, on success or failure.
#[derive(Debug)]
pub struct InFlightGuard {
    jobs: InFlightJobs,
    id: JobId,
}

impl InFlightGuard {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.jobs.lock().remove(&self.id);
    }
}
