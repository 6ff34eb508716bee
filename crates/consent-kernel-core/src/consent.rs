//! The consent state machine.
//!
//! Per key: `Absent -> Active -> Inactive`. Revoke is the only way to
//! deactivate; nothing re-activates an inactive record and nothing ever
//! removes a key, so a key can be granted at most once. Renew extends an
//! active, unexpired record from its previous expiry.
//!
//! `grant` and `revoke` stage their mutation, report it to the audit
//! collaborator, and only commit once the audit accepted it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audit::{AccessAudit, NullAudit};
use crate::category::CategoryRegistry;
use crate::delegation::DelegationRegistry;
use crate::error::{ConsentError, Result, Subject};
use crate::event::{ConsentEvent, EventRecord};
use crate::history::{HistoryAction, HistoryEntry, HistoryLog, MAX_DETAILS_LEN};
use crate::types::{truncate_utf8, BlockHeight, Call, Category, ConsentKey, Principal};

/// A consent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    /// Last height at which the consent is valid.
    pub expiry: BlockHeight,
    pub active: bool,
    pub granted_at: BlockHeight,
    /// The principal that created the record (granter or delegate).
    pub granted_by: Principal,
}

impl Consent {
    /// Active and not past its expiry at `now`.
    pub fn is_valid(&self, now: BlockHeight) -> bool {
        self.active && now <= self.expiry
    }
}

/// Which entry point a grant came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantPath {
    Owner,
    Delegate,
}

/// Consent records plus the registries they depend on.
pub struct ConsentStore<A: AccessAudit = NullAudit> {
    consents: HashMap<ConsentKey, Consent>,
    categories: CategoryRegistry,
    delegations: DelegationRegistry,
    history: HistoryLog,
    audit: A,
    outbox: Vec<EventRecord>,
}

impl<A: AccessAudit> ConsentStore<A> {
    /// Create an empty store and run the category bootstrap.
    pub fn new(audit: A) -> Self {
        Self::from_parts(
            HashMap::new(),
            CategoryRegistry::new(),
            DelegationRegistry::new(),
            HistoryLog::new(),
            audit,
        )
    }

    /// Rebuild a store from persisted parts.
    ///
    /// The category bootstrap still runs; it is a no-op for a registry
    /// that was initialized before it was persisted.
    pub fn from_parts(
        consents: HashMap<ConsentKey, Consent>,
        categories: CategoryRegistry,
        delegations: DelegationRegistry,
        history: HistoryLog,
        audit: A,
    ) -> Self {
        let mut store = Self {
            consents,
            categories,
            delegations,
            history,
            audit,
            outbox: Vec::new(),
        };
        let seeded = store.categories.bootstrap();
        if !seeded.is_empty() {
            store.emit(0, ConsentEvent::CategoriesBootstrapped { categories: seeded });
        }
        store
    }

    /// Swap in persisted state, keeping the audit sink. Pending events are
    /// discarded.
    pub fn replace_state(
        &mut self,
        consents: HashMap<ConsentKey, Consent>,
        categories: CategoryRegistry,
        delegations: DelegationRegistry,
        history: HistoryLog,
    ) {
        self.consents = consents;
        self.categories = categories;
        self.delegations = delegations;
        self.history = history;
        self.outbox.clear();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Categories
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_valid_category(&self, label: &str) -> bool {
        self.categories.is_valid(label)
    }

    pub fn add_category(&mut self, call: &Call, category: Category) -> Result<()> {
        self.categories.add(category.clone())?;
        self.emit(call.at, ConsentEvent::CategoryAdded { category });
        Ok(())
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `delegate` a delegate of the caller.
    pub fn add_delegate(&mut self, call: &Call, delegate: Principal) -> Result<()> {
        self.delegations.add_delegate(&call.caller, delegate.clone())?;
        self.emit(
            call.at,
            ConsentEvent::DelegateAdded {
                granter: call.caller.clone(),
                delegate,
            },
        );
        Ok(())
    }

    /// Remove `delegate` from the caller's delegates.
    pub fn remove_delegate(&mut self, call: &Call, delegate: &Principal) -> Result<()> {
        self.delegations.remove_delegate(&call.caller, delegate)?;
        self.emit(
            call.at,
            ConsentEvent::DelegateRemoved {
                granter: call.caller.clone(),
                delegate: delegate.clone(),
            },
        );
        Ok(())
    }

    pub fn delegates_of(&self, granter: &Principal) -> &[Principal] {
        self.delegations.delegates_of(granter)
    }

    pub fn delegations(&self) -> &DelegationRegistry {
        &self.delegations
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consent transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant as the granter.
    pub fn grant(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
    ) -> Result<Consent> {
        if &call.caller != granter {
            return Err(ConsentError::NotAuthorized {
                caller: call.caller.clone(),
                granter: granter.clone(),
            });
        }
        self.grant_inner(call, granter, grantee, category, duration, notes, GrantPath::Owner)
    }

    /// Grant on behalf of `granter` as one of its current delegates.
    pub fn grant_as_delegate(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
    ) -> Result<Consent> {
        if !self.delegations.is_delegate(granter, &call.caller) {
            return Err(ConsentError::NotDelegated {
                caller: call.caller.clone(),
                granter: granter.clone(),
            });
        }
        self.grant_inner(call, granter, grantee, category, duration, notes, GrantPath::Delegate)
    }

    #[allow(clippy::too_many_arguments)]
    fn grant_inner(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
        path: GrantPath,
    ) -> Result<Consent> {
        if !self.categories.is_valid(category.as_str()) {
            return Err(ConsentError::InvalidCategory(category.to_string()));
        }
        if duration == 0 {
            return Err(ConsentError::InvalidDuration);
        }

        let key = ConsentKey::new(granter.clone(), grantee.clone(), category.clone());
        if self.consents.contains_key(&key) {
            return Err(ConsentError::Conflict(Subject::Consent(key)));
        }

        let notes = notes.unwrap_or_default();
        if notes.len() > MAX_DETAILS_LEN {
            return Err(ConsentError::InvalidInput(format!(
                "notes exceed {} bytes",
                MAX_DETAILS_LEN
            )));
        }
        let expiry = call
            .at
            .checked_add(duration)
            .ok_or(ConsentError::InvalidDuration)?;

        let (action, details) = match path {
            GrantPath::Owner => (HistoryAction::Granted, notes.to_owned()),
            GrantPath::Delegate => {
                let tag = delegate_tag(&call.caller);
                // Only the notes give way; the tag is kept whole.
                let mut notes = notes.to_owned();
                truncate_utf8(&mut notes, MAX_DETAILS_LEN.saturating_sub(tag.len() + 2));
                (HistoryAction::GrantedByDelegate, join_details(&tag, &notes))
            }
        };
        let entry = self.history.prepare(&key, call.at, action, details);

        self.audit
            .log_access(&call.caller, granter, category, true)
            .map_err(|e| ConsentError::AuditFailed(e.to_string()))?;

        let consent = Consent {
            expiry,
            active: true,
            granted_at: call.at,
            granted_by: call.caller.clone(),
        };
        self.consents.insert(key.clone(), consent.clone());
        self.history.commit(&key, entry);
        self.emit(
            call.at,
            ConsentEvent::ConsentGranted {
                key,
                expiry,
                by: call.caller.clone(),
            },
        );
        Ok(consent)
    }

    /// Deactivate a consent. Expiry is left untouched.
    pub fn revoke(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
    ) -> Result<()> {
        self.require_authorized(call, granter)?;

        let key = ConsentKey::new(granter.clone(), grantee.clone(), category.clone());
        if !self.consents.contains_key(&key) {
            return Err(ConsentError::NotFound(Subject::Consent(key)));
        }

        let details = self.actor_details(call, granter);
        let entry = self
            .history
            .prepare(&key, call.at, HistoryAction::Revoked, details);

        self.audit
            .log_access(&call.caller, granter, category, true)
            .map_err(|e| ConsentError::AuditFailed(e.to_string()))?;

        if let Some(consent) = self.consents.get_mut(&key) {
            consent.active = false;
        }
        self.history.commit(&key, entry);
        self.emit(
            call.at,
            ConsentEvent::ConsentRevoked {
                key,
                by: call.caller.clone(),
            },
        );
        Ok(())
    }

    /// Extend an active, unexpired consent by `extra` blocks, counted from
    /// its current expiry.
    pub fn renew(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        extra: u64,
    ) -> Result<Consent> {
        self.require_authorized(call, granter)?;

        let key = ConsentKey::new(granter.clone(), grantee.clone(), category.clone());
        let old_expiry = match self.consents.get(&key) {
            None => return Err(ConsentError::NotFound(Subject::Consent(key))),
            Some(c) if !c.is_valid(call.at) => {
                return Err(ConsentError::ConsentExpiredOrInactive)
            }
            Some(c) => c.expiry,
        };
        if extra == 0 {
            return Err(ConsentError::InvalidDuration);
        }
        let new_expiry = old_expiry
            .checked_add(extra)
            .ok_or(ConsentError::InvalidDuration)?;

        let details = join_details(
            &format!("extended by {}", extra),
            &self.actor_details(call, granter),
        );
        self.history
            .append(&key, call.at, HistoryAction::Renewed, details);

        let mut renewed = None;
        if let Some(consent) = self.consents.get_mut(&key) {
            consent.expiry = new_expiry;
            renewed = Some(consent.clone());
        }
        self.emit(
            call.at,
            ConsentEvent::ConsentRenewed {
                key: key.clone(),
                old_expiry,
                new_expiry,
                by: call.caller.clone(),
            },
        );
        renewed.ok_or(ConsentError::NotFound(Subject::Consent(key)))
    }

    /// Succeeds iff the consent exists, is active and `now <= expiry`.
    pub fn check(
        &self,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        now: BlockHeight,
    ) -> Result<&Consent> {
        let key = ConsentKey::new(granter.clone(), grantee.clone(), category.clone());
        match self.consents.get(&key) {
            None => Err(ConsentError::NotFound(Subject::Consent(key))),
            Some(c) if !c.is_valid(now) => Err(ConsentError::ConsentExpiredOrInactive),
            Some(c) => Ok(c),
        }
    }

    pub fn get_details(&self, key: &ConsentKey) -> Option<&Consent> {
        self.consents.get(key)
    }

    pub fn get_history(&self, key: &ConsentKey) -> &[HistoryEntry] {
        self.history.get(key)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn consents(&self) -> impl Iterator<Item = (&ConsentKey, &Consent)> {
        self.consents.iter()
    }

    pub fn audit_mut(&mut self) -> &mut A {
        &mut self.audit
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn emit(&mut self, at: BlockHeight, event: ConsentEvent) {
        self.outbox.push(EventRecord { at, event });
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.outbox)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn require_authorized(&self, call: &Call, granter: &Principal) -> Result<()> {
        if self.delegations.is_authorized(granter, &call.caller) {
            Ok(())
        } else {
            Err(ConsentError::NotAuthorized {
                caller: call.caller.clone(),
                granter: granter.clone(),
            })
        }
    }

    /// Names the acting delegate, or nothing when the granter acts.
    fn actor_details(&self, call: &Call, granter: &Principal) -> String {
        if &call.caller == granter {
            String::new()
        } else {
            delegate_tag(&call.caller)
        }
    }
}

fn delegate_tag(delegate: &Principal) -> String {
    format!("delegate:{}", delegate)
}

fn join_details(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_owned(),
        (_, true) => head.to_owned(),
        _ => format!("{}; {}", head, tail),
    }
}
