use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::RecordId;

/// Minimum spacing, in seconds, between sweeps of lapsed entries in the
/// memory stores.
pub(crate) const SWEEP_INTERVAL_SECS: i64 = 60;

/// Returns true, and records `now`, when a sweep is due.
pub(crate) fn sweep_due(
    last_sweep: &Mutex<Option<DateTime<Utc>>>,
    now: DateTime<Utc>,
) -> bool {
    let mut last_sweep = last_sweep.lock();
    match *last_sweep {
        Some(at) if now < at + Duration::seconds(SWEEP_INTERVAL_SECS) => {
            false
        }
        _ => {
            *last_sweep = Some(now);
            true
        }
    }
}

/// What a stored token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Long-lived credential carried by cookies and the native session.
    Persistence,
    /// Short-lived, single-use handoff credential.
    Perishable,
    /// Non-expiring credential for stateless parameter access (feeds, API).
    SingleAccess,
}

impl TokenKind {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Persistence => "persistence",
            TokenKind::Perishable => "perishable",
            TokenKind::SingleAccess => "single_access",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored half of a token. The raw value is never kept; entries are indexed
/// by the HMAC digest of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// What the token may be used for.
    pub kind: TokenKind,
    /// Scope the token authenticates in.
    pub scope: String,
    /// Record the token resolves to.
    pub record_id: RecordId,
    /// When the token was minted.
    pub issued_at: DateTime<Utc>,
    /// Last request the token authenticated.
    pub last_activity: DateTime<Utc>,
    /// Hard end of the token's life: the end of a remembered login or of a
    /// perishable token's validity. Authoritative over anything the client
    /// presents.
    pub expires_at: Option<DateTime<Utc>>,
    /// Inactivity after which the token lapses.
    pub idle_timeout: Option<Duration>,
}

impl IssuedToken {
    /// The instant after which the token can no longer authenticate.
    pub fn lapses_at(&self) -> Option<DateTime<Utc>> {
        let idle = self.idle_timeout.map(|timeout| self.last_activity + timeout);
        match (self.expires_at, idle) {
            (Some(expires), Some(idle)) => Some(expires.min(idle)),
            (expires, idle) => expires.or(idle),
        }
    }

    /// Whether the token lapsed before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.lapses_at().is_some_and(|at| at < now)
    }
}

/// Storage for issued tokens.
///
/// Deployments with several processes should back this with the same store
/// that holds identity records.
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Store `token` under `digest`.
    fn insert(&self, digest: &str, token: IssuedToken) -> anyhow::Result<()>;

    /// Token stored under `digest`, lapsed or not.
    fn find(&self, digest: &str) -> anyhow::Result<Option<IssuedToken>>;

    /// Record activity on a token. Unknown digests are ignored.
    fn touch(&self, digest: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Remove the token stored under `digest`, returning it.
    fn revoke(&self, digest: &str) -> anyhow::Result<Option<IssuedToken>>;

    /// Revoke every token of `kind` bound to a record in a scope. Returns
    /// the number of revoked entries.
    fn revoke_for_record(
        &self,
        scope: &str,
        record_id: &RecordId,
        kind: TokenKind,
    ) -> anyhow::Result<u64>;

    /// Revoke every token of the same kind bound to the same record and
    /// scope as `token`, then insert `token`, as one step. Concurrent
    /// replacements for a record must leave exactly one of their tokens.
    fn replace_for_record(
        &self,
        digest: &str,
        token: IssuedToken,
    ) -> anyhow::Result<u64>;

    /// Drop every token that lapsed before `now`. Returns the number of
    /// dropped entries.
    fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}

/// Process-local token store.
///
/// Lapsed tokens are swept on insert, at most once a minute of token issue
/// time.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, IssuedToken>,
    /// Serializes record-wide replacements against each other.
    replacing: Mutex<()>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryTokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, lapsed ones included until swept.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are stored.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn sweep(&self, now: DateTime<Utc>) {
        if sweep_due(&self.last_sweep, now) {
            let purged = self.purge_lapsed(now);
            if purged > 0 {
                tracing::debug!(purged, "swept lapsed tokens");
            }
        }
    }

    fn purge_lapsed(&self, now: DateTime<Utc>) -> u64 {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired(now));
        before.saturating_sub(self.tokens.len()) as u64
    }

    fn remove_for_record(
        &self,
        scope: &str,
        record_id: &RecordId,
        kind: TokenKind,
    ) -> u64 {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| {
            !(token.kind == kind
                && token.scope == scope
                && &token.record_id == record_id)
        });
        before.saturating_sub(self.tokens.len()) as u64
    }
}

impl TokenStore for MemoryTokenStore {
    fn insert(&self, digest: &str, token: IssuedToken) -> anyhow::Result<()> {
        self.sweep(token.issued_at);
        self.tokens.insert(digest.to_string(), token);
        Ok(())
    }

    fn find(&self, digest: &str) -> anyhow::Result<Option<IssuedToken>> {
        Ok(self.tokens.get(digest).map(|entry| entry.value().clone()))
    }

    fn touch(&self, digest: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(mut entry) = self.tokens.get_mut(digest) {
            entry.last_activity = at;
        }
        Ok(())
    }

    fn revoke(&self, digest: &str) -> anyhow::Result<Option<IssuedToken>> {
        Ok(self.tokens.remove(digest).map(|(_, token)| token))
    }

    fn revoke_for_record(
        &self,
        scope: &str,
        record_id: &RecordId,
        kind: TokenKind,
    ) -> anyhow::Result<u64> {
        let _replacing = self.replacing.lock();
        Ok(self.remove_for_record(scope, record_id, kind))
    }

    fn replace_for_record(
        &self,
        digest: &str,
        token: IssuedToken,
    ) -> anyhow::Result<u64> {
        self.sweep(token.issued_at);
        let _replacing = self.replacing.lock();
        let revoked =
            self.remove_for_record(&token.scope, &token.record_id, token.kind);
        self.tokens.insert(digest.to_string(), token);
        Ok(revoked)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(self.purge_lapsed(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issued(kind: TokenKind, record: u64) -> IssuedToken {
        issued_at(kind, record, Utc::now())
    }

    fn issued_at(
        kind: TokenKind,
        record: u64,
        now: DateTime<Utc>,
    ) -> IssuedToken {
        IssuedToken {
            kind,
            scope: "user".to_string(),
            record_id: RecordId::from(record),
            issued_at: now,
            last_activity: now,
            expires_at: None,
            idle_timeout: None,
        }
    }

    #[test]
    fn revoke_for_record_only_touches_matching_kind() {
        let store = MemoryTokenStore::new();
        store
            .insert("a", issued(TokenKind::Persistence, 1))
            .unwrap();
        store.insert("b", issued(TokenKind::Perishable, 1)).unwrap();
        store
            .insert("c", issued(TokenKind::Persistence, 2))
            .unwrap();

        let revoked = store
            .revoke_for_record(
                "user",
                &RecordId::from(1u64),
                TokenKind::Persistence,
            )
            .unwrap();

        assert_eq!(revoked, 1);
        assert!(store.find("a").unwrap().is_none());
        assert!(store.find("b").unwrap().is_some());
        assert!(store.find("c").unwrap().is_some());
    }

    #[test]
    fn touch_updates_last_activity() {
        let store = MemoryTokenStore::new();
        store
            .insert("a", issued(TokenKind::Persistence, 1))
            .unwrap();
        let later = Utc::now() + chrono::Duration::minutes(3);
        store.touch("a", later).unwrap();
        assert_eq!(store.find("a").unwrap().unwrap().last_activity, later);
        store.touch("missing", later).unwrap();
    }

    #[test]
    fn lapses_at_takes_the_earlier_of_expiry_and_idle_window() {
        let now = Utc::now();
        let mut token = issued_at(TokenKind::Persistence, 1, now);
        assert_eq!(token.lapses_at(), None);
        assert!(!token.is_expired(now + Duration::days(3650)));

        token.expires_at = Some(now + Duration::days(1));
        token.idle_timeout = Some(Duration::minutes(30));
        assert_eq!(token.lapses_at(), Some(now + Duration::minutes(30)));
        assert!(!token.is_expired(now + Duration::minutes(30)));
        assert!(token.is_expired(now + Duration::minutes(31)));

        token.last_activity = now + Duration::hours(23) + Duration::minutes(50);
        assert_eq!(token.lapses_at(), Some(now + Duration::days(1)));
    }

    #[test]
    fn purge_expired_keeps_live_tokens() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let mut remembered = issued_at(TokenKind::Persistence, 1, now);
        remembered.expires_at = Some(now + Duration::days(1));
        let mut idle = issued_at(TokenKind::Persistence, 2, now);
        idle.idle_timeout = Some(Duration::hours(1));
        store.insert("remembered", remembered).unwrap();
        store.insert("idle", idle).unwrap();
        store
            .insert("forever", issued_at(TokenKind::SingleAccess, 3, now))
            .unwrap();

        assert_eq!(store.purge_expired(now + Duration::hours(2)).unwrap(), 1);
        assert!(store.find("idle").unwrap().is_none());
        assert_eq!(store.purge_expired(now + Duration::days(2)).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.find("forever").unwrap().is_some());
    }

    #[test]
    fn inserts_sweep_lapsed_tokens() {
        let store = MemoryTokenStore::new();
        let start = Utc::now();
        for record in 0..1_000u64 {
            let mut token = issued_at(TokenKind::Persistence, record, start);
            token.expires_at = Some(start + Duration::days(1));
            store.insert(&format!("digest-{record}"), token).unwrap();
        }
        assert_eq!(store.len(), 1_000);

        let later = start + Duration::days(30);
        store
            .insert("fresh", issued_at(TokenKind::Persistence, 1, later))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.find("fresh").unwrap().is_some());
    }

    #[test]
    fn replace_for_record_leaves_only_the_new_token() {
        let store = MemoryTokenStore::new();
        store.insert("old", issued(TokenKind::Perishable, 1)).unwrap();
        store
            .insert("persisted", issued(TokenKind::Persistence, 1))
            .unwrap();

        let revoked = store
            .replace_for_record("new", issued(TokenKind::Perishable, 1))
            .unwrap();

        assert_eq!(revoked, 1);
        assert!(store.find("old").unwrap().is_none());
        assert!(store.find("new").unwrap().is_some());
        assert!(store.find("persisted").unwrap().is_some());
    }

    #[test]
    fn concurrent_replacements_keep_one_token_per_record() {
        let store = MemoryTokenStore::new();
        for round in 0..200 {
            std::thread::scope(|scope| {
                for worker in 0..4 {
                    let store = &store;
                    scope.spawn(move || {
                        store
                            .replace_for_record(
                                &format!("{round}-{worker}"),
                                issued(TokenKind::Perishable, 1),
                            )
                            .unwrap();
                    });
                }
            });
            assert_eq!(store.len(), 1, "round {round}");
        }
    }
}
