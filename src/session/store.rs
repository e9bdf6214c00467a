//! In-memory session store with sliding expiration
//!
//! The map is only touched from the owning process's event loop, so it
//! lives in a `RefCell`. Borrows never span an await point.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::now_millis;
use crate::config::SessionConfig;
use crate::http::{CookieJar, CookieValue};
use crate::replication::{ReplicationMessage, ReplicationSender};

/// TTL plus key/value data for one session identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Absolute expiry, milliseconds since the Unix epoch
    pub ttl: i64,
    #[serde(rename = "session", default)]
    pub data: Map<String, Value>,
}

impl SessionRecord {
    pub fn new(ttl: i64) -> Self {
        Self {
            ttl,
            data: Map::new(),
        }
    }

    pub const fn is_expired(&self, now: i64) -> bool {
        self.ttl < now
    }
}

/// Session identifier to record
pub type SessionMap = HashMap<String, SessionRecord>;

pub struct SessionStore {
    records: RefCell<SessionMap>,
    window_ms: i64,
    cookie_name: String,
    replication: ReplicationSender,
}

impl SessionStore {
    pub fn new(config: &SessionConfig, replication: ReplicationSender) -> Self {
        Self::with_window(config.ttl(), config.cookie_name.clone(), replication)
    }

    pub fn with_window(
        window: Duration,
        cookie_name: impl Into<String>,
        replication: ReplicationSender,
    ) -> Self {
        Self {
            records: RefCell::new(HashMap::new()),
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            cookie_name: cookie_name.into(),
            replication,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.borrow().contains_key(id)
    }

    pub fn record(&self, id: &str) -> Option<SessionRecord> {
        self.records.borrow().get(id).cloned()
    }

    /// Copy of the whole map, as carried by a sync message
    pub fn snapshot(&self) -> SessionMap {
        self.records.borrow().clone()
    }

    /// Value stored under `key`, refreshing the session's expiry
    pub fn get(&self, id: &str, key: &str) -> Option<Value> {
        self.get_at(id, key, now_millis())
    }

    pub fn get_at(&self, id: &str, key: &str, now: i64) -> Option<Value> {
        let mut records = self.records.borrow_mut();
        let record = records.get_mut(id)?;
        let value = record.data.get(key).cloned()?;
        record.ttl = now.saturating_add(self.window_ms);
        Some(value)
    }

    /// Store `key → value`, creating the record if needed, then broadcast
    /// the full map to sibling processes
    pub fn set(&self, id: &str, key: &str, value: impl Into<Value>) {
        self.set_at(id, key, value.into(), now_millis());
    }

    pub fn set_at(&self, id: &str, key: &str, value: Value, now: i64) {
        let expires = now.saturating_add(self.window_ms);
        {
            let mut records = self.records.borrow_mut();
            let record = records
                .entry(id.to_string())
                .or_insert_with(|| SessionRecord::new(expires));
            record.data.insert(key.to_string(), value);
            record.ttl = expires;
        }
        self.replication.broadcast(ReplicationMessage::Sync {
            session: self.snapshot(),
        });
    }

    /// Fresh identifier not present in the map
    pub fn allocate_id(&self) -> String {
        let records = self.records.borrow();
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if !records.contains_key(&id) {
                return id;
            }
        }
    }

    /// Bind a request's cookie set to a session
    ///
    /// Reuses the identifier carried by the session cookie; otherwise
    /// allocates one and queues it in the jar for the next flush.
    pub fn bind(self: &Rc<Self>, cookies: &mut CookieJar) -> Session {
        let existing = cookies
            .get(&self.cookie_name)
            .and_then(CookieValue::as_text)
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.allocate_id();
                tracing::debug!(session = %id, "allocated session id");
                cookies.set(self.cookie_name.clone(), id.clone());
                id
            }
        };

        Session {
            store: Rc::clone(self),
            id,
        }
    }

    /// Announce every expired record; removal waits for the broadcast to
    /// come back through [`SessionStore::apply`]
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(now_millis())
    }

    pub fn sweep_at(&self, now: i64) -> Vec<String> {
        let expired: Vec<String> = self
            .records
            .borrow()
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            tracing::debug!(session = %id, "session expired, announcing");
            self.replication
                .broadcast(ReplicationMessage::Expire { uid: id.clone() });
        }
        expired
    }

    /// Apply a replication message received from the channel
    pub fn apply(&self, message: ReplicationMessage) {
        match message {
            ReplicationMessage::Sync { session } => self.merge(session),
            ReplicationMessage::Expire { uid } => {
                if self.records.borrow_mut().remove(&uid).is_some() {
                    tracing::debug!(session = %uid, "session removed");
                }
            }
        }
    }

    /// Field-level union: incoming keys win, unrelated keys survive, an
    /// existing expiry is never lowered
    fn merge(&self, incoming: SessionMap) {
        let mut records = self.records.borrow_mut();
        for (id, record) in incoming {
            match records.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    let local = slot.get_mut();
                    local.data.extend(record.data);
                    local.ttl = local.ttl.max(record.ttl);
                }
            }
        }
    }
}

/// Session handle bound to one request
#[derive(Clone)]
pub struct Session {
    store: Rc<SessionStore>,
    id: String,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.id, key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.store.set(&self.id, key, value);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication;
    use serde_json::json;

    const WINDOW_MS: i64 = 1_800_000;

    fn detached_store() -> Rc<SessionStore> {
        Rc::new(SessionStore::new(
            &SessionConfig::default(),
            ReplicationSender::detached(),
        ))
    }

    #[test]
    fn test_unknown_session_is_absent() {
        let store = detached_store();
        assert_eq!(store.get("never-seen", "anything"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let store = detached_store();
        store.set("abc", "user", "alice");
        assert_eq!(store.get("abc", "user"), Some(json!("alice")));
        assert_eq!(store.get("abc", "other"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sliding_expiration() {
        let store = detached_store();
        store.set_at("abc", "n", json!(1), 1_000);
        assert_eq!(store.record("abc").unwrap().ttl, 1_000 + WINDOW_MS);

        store.get_at("abc", "n", 5_000);
        assert_eq!(store.record("abc").unwrap().ttl, 5_000 + WINDOW_MS);

        // missing key leaves the horizon alone
        store.get_at("abc", "missing", 9_000);
        assert_eq!(store.record("abc").unwrap().ttl, 5_000 + WINDOW_MS);

        store.set_at("abc", "n", json!(2), 7_000);
        assert_eq!(store.record("abc").unwrap().ttl, 7_000 + WINDOW_MS);
    }

    #[test]
    fn test_set_broadcasts_full_map() {
        let (sender, mut outbound) = replication::channel(8);
        let store = SessionStore::new(&SessionConfig::default(), sender);
        store.set("a", "x", 1);
        store.set("b", "y", 2);

        let _first = outbound.try_recv().unwrap();
        match outbound.try_recv().unwrap() {
            ReplicationMessage::Sync { session } => {
                assert_eq!(session.len(), 2);
                assert_eq!(session["a"].data["x"], json!(1));
                assert_eq!(session["b"].data["y"], json!(2));
            }
            other @ ReplicationMessage::Expire { .. } => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_allocate_id_is_fresh() {
        let store = detached_store();
        let a = store.allocate_id();
        store.set(&a, "k", true);
        let b = store.allocate_id();
        assert_ne!(a, b);
        assert!(!store.contains(&b));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_bind_without_cookie_allocates() {
        let store = detached_store();
        let mut jar = CookieJar::default();
        let session = store.bind(&mut jar);

        assert!(jar.has_pending());
        assert_eq!(
            jar.get("SESSID").and_then(CookieValue::as_text),
            Some(session.id())
        );
    }

    #[test]
    fn test_bind_reuses_cookie() {
        let store = detached_store();
        let mut jar = CookieJar::parse(["SESSID=known; theme=dark"]);
        let session = store.bind(&mut jar);
        assert_eq!(session.id(), "known");
        assert!(!jar.has_pending());
    }

    #[test]
    fn test_bind_flag_cookie_allocates() {
        let store = detached_store();
        let mut jar = CookieJar::parse(["SESSID"]);
        let session = store.bind(&mut jar);
        assert_ne!(session.id(), "true");
        assert!(jar.has_pending());
    }

    #[test]
    fn test_custom_cookie_name() {
        let store = Rc::new(SessionStore::with_window(
            Duration::from_secs(60),
            "SID",
            ReplicationSender::detached(),
        ));
        let mut jar = CookieJar::parse(["SESSID=ignored; SID=mine"]);
        assert_eq!(store.bind(&mut jar).id(), "mine");
    }

    #[test]
    fn test_session_handle_round_trip() {
        let store = detached_store();
        let mut jar = CookieJar::default();
        let session = store.bind(&mut jar);
        assert_eq!(session.get("count"), None);
        session.set("count", 3);
        assert_eq!(session.get("count"), Some(json!(3)));
        assert!(store.contains(session.id()));
    }

    #[test]
    fn test_sweep_announces_without_deleting() {
        let (sender, mut outbound) = replication::channel(8);
        let store = SessionStore::new(&SessionConfig::default(), sender);
        store.set_at("old", "k", json!(1), 0);
        store.set_at("fresh", "k", json!(1), 10 * WINDOW_MS);
        while outbound.try_recv().is_ok() {}

        let expired = store.sweep_at(2 * WINDOW_MS);
        assert_eq!(expired, vec!["old".to_string()]);
        assert!(store.contains("old"));
        assert_eq!(
            outbound.try_recv().unwrap(),
            ReplicationMessage::Expire { uid: "old".into() }
        );

        store.apply(ReplicationMessage::Expire { uid: "old".into() });
        assert!(!store.contains("old"));
        assert!(store.contains("fresh"));
    }

    #[test]
    fn test_sync_merge_is_union() {
        let store = detached_store();
        let mut first = SessionMap::new();
        let mut record = SessionRecord::new(100);
        record.data.insert("x".into(), json!(1));
        first.insert("A".into(), record);

        let mut second = SessionMap::new();
        let mut record = SessionRecord::new(50);
        record.data.insert("y".into(), json!(2));
        second.insert("A".into(), record);

        store.apply(ReplicationMessage::Sync { session: first });
        store.apply(ReplicationMessage::Sync { session: second });

        let merged = store.record("A").unwrap();
        assert_eq!(merged.data["x"], json!(1));
        assert_eq!(merged.data["y"], json!(2));
        assert_eq!(merged.ttl, 100);

        store.apply(ReplicationMessage::Expire { uid: "A".into() });
        assert!(!store.contains("A"));
    }

    #[test]
    fn test_sync_incoming_key_wins() {
        let store = detached_store();
        store.set_at("A", "x", json!("local"), 0);
        store.set_at("A", "keep", json!(true), 0);

        let mut incoming = SessionMap::new();
        let mut record = SessionRecord::new(WINDOW_MS + 10);
        record.data.insert("x".into(), json!("remote"));
        incoming.insert("A".into(), record);
        store.apply(ReplicationMessage::Sync { session: incoming });

        let merged = store.record("A").unwrap();
        assert_eq!(merged.data["x"], json!("remote"));
        assert_eq!(merged.data["keep"], json!(true));
        assert_eq!(merged.ttl, WINDOW_MS + 10);
    }

    #[test]
    fn test_expire_unknown_is_noop() {
        let store = detached_store();
        store.apply(ReplicationMessage::Expire { uid: "ghost".into() });
        assert!(store.is_empty());
    }
}
