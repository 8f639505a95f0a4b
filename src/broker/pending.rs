use super::TrustContinuation;
use crate::{
    error::{AppResult, ErrorReason},
    store::TrustStore,
    types::{Fingerprint, Host, SerializedCertificate},
};
use chrono::{DateTime, Utc};
use std::collections::{hash_map::Entry, HashMap};

/// What accepting a pending request writes into the trust store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitAction {
    pub host: Host,
    pub serialized: SerializedCertificate,
}

impl CommitAction {
    pub async fn apply(self, store: &mut TrustStore) {
        store.set(self.host, self.serialized).await;
    }
}

#[derive(Debug)]
pub struct PendingRequest {
    pub commit: CommitAction,
    pub continuations: Vec<TrustContinuation>,
    pub opened_at: DateTime<Utc>,
}

/// Outstanding trust decisions keyed by fingerprint.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<Fingerprint, PendingRequest>,
}

/// Result of [`PendingRequests::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// No request was outstanding; a new one holds the continuation.
    Opened,
    /// The continuation joined an outstanding request.
    Queued,
}

impl PendingRequests {
    #[cfg(test)]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Attaches `continuation` to the request for `fingerprint`, opening one
    /// with `commit` if none is outstanding. `commit` is discarded when the
    /// request already exists.
    pub fn admit(
        &mut self,
        fingerprint: Fingerprint,
        commit: CommitAction,
        continuation: TrustContinuation,
    ) -> Admission {
        match self.entries.entry(fingerprint) {
            Entry::Occupied(mut entry) => {
                let continuations = &mut entry.get_mut().continuations;
                continuations.push(continuation);
                let queued = continuations.len();
                debug!("Queued continuation #{} for {}", queued, entry.key());
                Admission::Queued
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingRequest {
                    commit,
                    continuations: vec![continuation],
                    opened_at: Utc::now(),
                });
                Admission::Opened
            }
        }
    }

    pub fn take(&mut self, fingerprint: &Fingerprint) -> AppResult<PendingRequest> {
        self.entries
            .remove(fingerprint)
            .ok_or_else(|| ErrorReason::UnknownFingerprint(fingerprint.clone()).into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
