//! Bounded, hash-chained history per consent key.
//!
//! Each key keeps at most [`MAX_HISTORY`] entries. When the window is full
//! the oldest entry is evicted before the new one is appended, so the
//! window always reads oldest to newest.
//!
//! Every entry commits to its predecessor through `prev_digest`. Eviction
//! drops the head of the chain but never breaks the links between the
//! entries that remain, so a retained window can always be re-verified.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bounded::BoundedVec;
use crate::canonical::{canonical_entry_bytes, EntryFields};
use crate::digest::{Digest, HISTORY_DOMAIN};
use crate::error::{ConsentError, Result};
use crate::types::{truncate_utf8, BlockHeight, ConsentKey};

/// Maximum number of retained entries per key.
pub const MAX_HISTORY: usize = 50;

/// Maximum length of an entry's details in bytes.
pub const MAX_DETAILS_LEN: usize = 128;

/// The state transition an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryAction {
    Granted,
    GrantedByDelegate,
    Revoked,
    Renewed,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Granted => "granted",
            HistoryAction::GrantedByDelegate => "granted-by-delegate",
            HistoryAction::Revoked => "revoked",
            HistoryAction::Renewed => "renewed",
        }
    }

    /// Stable code used in the canonical encoding and in storage.
    pub fn code(self) -> u8 {
        match self {
            HistoryAction::Granted => 0,
            HistoryAction::GrantedByDelegate => 1,
            HistoryAction::Revoked => 2,
            HistoryAction::Renewed => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HistoryAction::Granted),
            1 => Some(HistoryAction::GrantedByDelegate),
            2 => Some(HistoryAction::Revoked),
            3 => Some(HistoryAction::Renewed),
            _ => None,
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record of a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position in the key's full history, counting evicted entries.
    pub seq: u64,
    pub at: BlockHeight,
    pub action: HistoryAction,
    pub details: String,
    pub prev_digest: Digest,
    pub digest: Digest,
}

impl HistoryEntry {
    /// Recompute the digest this entry should carry.
    pub fn compute_digest(&self, key: &ConsentKey) -> Digest {
        entry_digest(key, self.seq, self.at, self.action, &self.details, &self.prev_digest)
    }
}

fn entry_digest(
    key: &ConsentKey,
    seq: u64,
    at: BlockHeight,
    action: HistoryAction,
    details: &str,
    prev_digest: &Digest,
) -> Digest {
    let bytes = canonical_entry_bytes(&EntryFields {
        key,
        seq,
        at,
        action,
        details,
        prev_digest,
    });
    Digest::hash_with_domain(HISTORY_DOMAIN, &bytes)
}

/// The retained window for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Sequence number the next entry will get.
    pub next_seq: u64,
    /// Digest of the most recently appended entry.
    pub head: Digest,
    pub entries: BoundedVec<HistoryEntry, MAX_HISTORY>,
}

impl History {
    /// Build the entry that would be appended next, without appending it.
    pub fn prepare(
        &self,
        key: &ConsentKey,
        at: BlockHeight,
        action: HistoryAction,
        mut details: String,
    ) -> HistoryEntry {
        truncate_utf8(&mut details, MAX_DETAILS_LEN);
        let seq = self.next_seq;
        let prev_digest = self.head;
        let digest = entry_digest(key, seq, at, action, &details, &prev_digest);
        HistoryEntry {
            seq,
            at,
            action,
            details,
            prev_digest,
            digest,
        }
    }

    /// Append a prepared entry, evicting the oldest when full.
    fn commit(&mut self, entry: HistoryEntry) {
        self.next_seq = entry.seq + 1;
        self.head = entry.digest;
        self.entries.push_evicting(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        self.entries.as_slice()
    }

    /// Check every digest and every link in the retained window.
    pub fn verify(&self, key: &ConsentKey) -> Result<()> {
        let mut expected_prev: Option<Digest> = None;
        for entry in self.entries.iter() {
            let linked = expected_prev.map_or(true, |prev| prev == entry.prev_digest);
            if !linked || entry.compute_digest(key) != entry.digest {
                return Err(ConsentError::HistoryCorrupted {
                    key: key.clone(),
                    seq: entry.seq,
                });
            }
            expected_prev = Some(entry.digest);
        }

        if let Some(last) = self.entries.last() {
            if last.digest != self.head || last.seq + 1 != self.next_seq {
                return Err(ConsentError::HistoryCorrupted {
                    key: key.clone(),
                    seq: last.seq,
                });
            }
        }
        Ok(())
    }
}

/// History windows for every key that has ever been granted.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    by_key: HashMap<ConsentKey, History>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(windows: impl IntoIterator<Item = (ConsentKey, History)>) -> Self {
        Self {
            by_key: windows.into_iter().collect(),
        }
    }

    /// Build the next entry for `key` without appending it.
    pub fn prepare(
        &self,
        key: &ConsentKey,
        at: BlockHeight,
        action: HistoryAction,
        details: String,
    ) -> HistoryEntry {
        match self.by_key.get(key) {
            Some(history) => history.prepare(key, at, action, details),
            None => History::default().prepare(key, at, action, details),
        }
    }

    /// Append an entry produced by [`prepare`](Self::prepare).
    pub fn commit(&mut self, key: &ConsentKey, entry: HistoryEntry) {
        self.by_key.entry(key.clone()).or_default().commit(entry);
    }

    /// Prepare and append in one step.
    pub fn append(
        &mut self,
        key: &ConsentKey,
        at: BlockHeight,
        action: HistoryAction,
        details: String,
    ) -> HistoryEntry {
        let entry = self.prepare(key, at, action, details);
        self.commit(key, entry.clone());
        entry
    }

    /// Retained entries for `key`, oldest first.
    pub fn get(&self, key: &ConsentKey) -> &[HistoryEntry] {
        self.by_key.get(key).map(History::entries).unwrap_or(&[])
    }

    pub fn window(&self, key: &ConsentKey) -> Option<&History> {
        self.by_key.get(key)
    }

    pub fn verify(&self, key: &ConsentKey) -> Result<()> {
        match self.by_key.get(key) {
            Some(history) => history.verify(key),
            None => Ok(()),
        }
    }

    pub fn verify_all(&self) -> Result<()> {
        self.by_key
            .iter()
            .try_for_each(|(key, history)| history.verify(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConsentKey, &History)> {
        self.by_key.iter()
    }
}
