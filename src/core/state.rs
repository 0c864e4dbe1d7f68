//! Process-wide engine state.
//!
//! Built once at startup and shared behind an `Arc`. Nothing here is
//! persisted; a restart forgets trip posts, pickers and pending jobs.
//! Locks are only ever held for synchronous work, never across an await.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::schedule::{LeadTime, Scheduled, Selection, SelectionToken};

/// Registry key: one job per lead time per origin message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub chat_id: i64,
    pub origin_message_id: i32,
    pub lead: LeadTime,
}

#[derive(Debug, Clone)]
pub struct RegisteredJob {
    pub fire_at: DateTime<Utc>,
    pub scheduled: Scheduled,
}

#[derive(Default)]
pub struct EngineState {
    last_trip: RwLock<HashMap<i64, String>>,
    selections: Mutex<HashMap<SelectionToken, Selection>>,
    jobs: Mutex<HashMap<JobKey, RegisteredJob>>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remember_trip(&self, chat_id: i64, text: &str) {
        self.last_trip.write().await.insert(chat_id, text.to_string());
    }

    pub async fn last_trip(&self, chat_id: i64) -> Option<String> {
        self.last_trip.read().await.get(&chat_id).cloned()
    }

    /// Store a new picker. Pickers whose pickup already passed are evicted.
    pub async fn insert_selection(&self, selection: Selection, now: DateTime<Utc>) {
        let mut selections = self.selections.lock().await;
        selections.retain(|_, s| s.pickup_utc() > now);
        selections.insert(selection.token, selection);
    }

    /// Direct access for transitions that must read and write atomically.
    pub async fn selections(&self) -> MutexGuard<'_, HashMap<SelectionToken, Selection>> {
        self.selections.lock().await
    }

    pub async fn selection_count(&self) -> usize {
        self.selections.lock().await.len()
    }

    /// Record a job, returning the one it replaces. Entries already due are pruned.
    pub async fn register_job(
        &self,
        key: JobKey,
        job: RegisteredJob,
        now: DateTime<Utc>,
    ) -> Option<RegisteredJob> {
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|_, j| j.fire_at > now);
        jobs.insert(key, job)
    }

    pub async fn take_job(&self, key: &JobKey) -> Option<RegisteredJob> {
        self.jobs.lock().await.remove(key)
    }

    /// Pending lead times for one origin message, largest first.
    pub async fn pending_leads(&self, chat_id: i64, origin_message_id: i32) -> Vec<LeadTime> {
        let jobs = self.jobs.lock().await;
        let mut leads: Vec<LeadTime> = jobs
            .keys()
            .filter(|k| k.chat_id == chat_id && k.origin_message_id == origin_message_id)
            .map(|k| k.lead)
            .collect();
        leads.sort_by(|a, b| b.cmp(a));
        leads
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
