//! SQLite implementation of the Store trait.
//!
//! This is the persistent backend for the Consent Kernel. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use consent_kernel_core::{
    BoundedVec, Category, Consent, ConsentKey, Digest, EngineSnapshot, History, HistoryAction,
    HistoryEntry, Principal, Template,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Changeset, Store};

const INITIALIZED_FLAG: &str = "categories_initialized";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, creating and migrating it
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("blocking task failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column encoding
// ─────────────────────────────────────────────────────────────────────────────

// Heights and counters are u64; SQLite integers are i64. The bit pattern is
// stored as-is.
fn to_sql_u64(v: u64) -> i64 {
    v as i64
}

fn from_sql_u64(v: i64) -> u64 {
    v as u64
}

fn principal(s: String) -> Result<Principal> {
    Principal::new(s).map_err(StoreError::invalid)
}

fn category(s: String) -> Result<Category> {
    Category::new(s).map_err(StoreError::invalid)
}

fn consent_key(granter: String, grantee: String, cat: String) -> Result<ConsentKey> {
    Ok(ConsentKey::new(
        principal(granter)?,
        principal(grantee)?,
        category(cat)?,
    ))
}

fn digest(bytes: Vec<u8>) -> Result<Digest> {
    Digest::try_from(bytes.as_slice())
        .map_err(|_| StoreError::invalid(format!("digest of {} bytes", bytes.len())))
}

fn encode_categories(categories: &[Category]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(categories, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_categories(bytes: &[u8]) -> Result<Vec<Category>> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────────────────────────

type ConsentRow = (String, String, String, i64, bool, i64, String);

fn consent_from_row(row: ConsentRow) -> Result<(ConsentKey, Consent)> {
    let (granter, grantee, cat, expiry, active, granted_at, granted_by) = row;
    Ok((
        consent_key(granter, grantee, cat)?,
        Consent {
            expiry: from_sql_u64(expiry),
            active,
            granted_at: from_sql_u64(granted_at),
            granted_by: principal(granted_by)?,
        },
    ))
}

fn read_consents(conn: &Connection) -> Result<Vec<(ConsentKey, Consent)>> {
    let mut stmt = conn.prepare(
        "SELECT granter, grantee, category, expiry, active, granted_at, granted_by
         FROM consents ORDER BY granter, grantee, category",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<ConsentRow>>>()?;
    rows.into_iter().map(consent_from_row).collect()
}

fn read_consent(conn: &Connection, key: &ConsentKey) -> Result<Option<Consent>> {
    let row: Option<ConsentRow> = conn
        .query_row(
            "SELECT granter, grantee, category, expiry, active, granted_at, granted_by
             FROM consents WHERE granter = ?1 AND grantee = ?2 AND category = ?3",
            params![key.granter.as_str(), key.grantee.as_str(), key.category.as_str()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()?;
    row.map(|r| consent_from_row(r).map(|(_, c)| c)).transpose()
}

fn read_categories(conn: &Connection) -> Result<Vec<Category>> {
    let labels = conn
        .prepare("SELECT label FROM categories ORDER BY label")?
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut categories = labels.into_iter().map(category).collect::<Result<Vec<_>>>()?;
    // SQLite orders TEXT by bytes, which matches `String`'s `Ord`.
    categories.sort();
    Ok(categories)
}

fn read_initialized(conn: &Connection) -> Result<bool> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM registry_meta WHERE key = ?1",
            params![INITIALIZED_FLAG],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0) != 0)
}

fn read_delegates(conn: &Connection, granter: &Principal) -> Result<Vec<Principal>> {
    let ids = conn
        .prepare("SELECT delegate FROM delegations WHERE granter = ?1 ORDER BY position")?
        .query_map(params![granter.as_str()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    ids.into_iter().map(principal).collect()
}

fn read_delegations(conn: &Connection) -> Result<Vec<(Principal, Vec<Principal>)>> {
    let rows = conn
        .prepare("SELECT granter, delegate FROM delegations ORDER BY granter, position")?
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut grouped: BTreeMap<Principal, Vec<Principal>> = BTreeMap::new();
    for (granter, delegate) in rows {
        grouped
            .entry(principal(granter)?)
            .or_default()
            .push(principal(delegate)?);
    }
    Ok(grouped.into_iter().collect())
}

type TemplateRow = (String, Vec<u8>, i64, String);

fn template_from_row(row: TemplateRow) -> Result<Template> {
    let (name, categories, duration, description) = row;
    let categories = BoundedVec::try_from(decode_categories(&categories)?)
        .map_err(|e| StoreError::invalid(format!("template {}: {}", name, e)))?;
    Ok(Template {
        name,
        categories,
        duration: from_sql_u64(duration),
        description,
    })
}

fn read_templates(conn: &Connection) -> Result<Vec<Template>> {
    let rows = conn
        .prepare("SELECT name, categories, duration, description FROM templates ORDER BY name")?
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<rusqlite::Result<Vec<TemplateRow>>>()?;
    rows.into_iter().map(template_from_row).collect()
}

fn read_template(conn: &Connection, name: &str) -> Result<Option<Template>> {
    let row: Option<TemplateRow> = conn
        .query_row(
            "SELECT name, categories, duration, description FROM templates WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;
    row.map(template_from_row).transpose()
}

fn read_history(conn: &Connection, key: &ConsentKey) -> Result<Option<History>> {
    let head: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT next_seq, head FROM history_heads
             WHERE granter = ?1 AND grantee = ?2 AND category = ?3",
            params![key.granter.as_str(), key.grantee.as_str(), key.category.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((next_seq, head)) = head else {
        return Ok(None);
    };

    let rows = conn
        .prepare(
            "SELECT seq, at, action, details, prev_digest, digest FROM history
             WHERE granter = ?1 AND grantee = ?2 AND category = ?3 ORDER BY seq",
        )?
        .query_map(
            params![key.granter.as_str(), key.grantee.as_str(), key.category.as_str()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                ))
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut entries = Vec::with_capacity(rows.len());
    for (seq, at, action, details, prev_digest, entry_digest) in rows {
        let action = HistoryAction::from_code(action)
            .ok_or_else(|| StoreError::invalid(format!("history action code {}", action)))?;
        entries.push(HistoryEntry {
            seq: from_sql_u64(seq),
            at: from_sql_u64(at),
            action,
            details,
            prev_digest: digest(prev_digest)?,
            digest: digest(entry_digest)?,
        });
    }

    Ok(Some(History {
        next_seq: from_sql_u64(next_seq),
        head: digest(head)?,
        entries: BoundedVec::try_from(entries)
            .map_err(|e| StoreError::invalid(format!("history of {}: {}", key, e)))?,
    }))
}

fn read_all_history(conn: &Connection) -> Result<Vec<(ConsentKey, History)>> {
    let keys = conn
        .prepare(
            "SELECT granter, grantee, category FROM history_heads
             ORDER BY granter, grantee, category",
        )?
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out = Vec::with_capacity(keys.len());
    for (granter, grantee, cat) in keys {
        let key = consent_key(granter, grantee, cat)?;
        if let Some(history) = read_history(conn, &key)? {
            out.push((key, history));
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────────────────────────

fn write_changeset(tx: &Transaction<'_>, changes: &Changeset) -> Result<()> {
    for (key, consent) in &changes.consents {
        tx.execute(
            "INSERT OR REPLACE INTO consents
             (granter, grantee, category, expiry, active, granted_at, granted_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.granter.as_str(),
                key.grantee.as_str(),
                key.category.as_str(),
                to_sql_u64(consent.expiry),
                consent.active,
                to_sql_u64(consent.granted_at),
                consent.granted_by.as_str(),
            ],
        )?;
    }

    for category in &changes.categories {
        tx.execute(
            "INSERT OR IGNORE INTO categories (label) VALUES (?1)",
            params![category.as_str()],
        )?;
    }
    if changes.categories_initialized {
        tx.execute(
            "INSERT OR REPLACE INTO registry_meta (key, value) VALUES (?1, 1)",
            params![INITIALIZED_FLAG],
        )?;
    }

    for (granter, delegates) in &changes.delegations {
        tx.execute(
            "DELETE FROM delegations WHERE granter = ?1",
            params![granter.as_str()],
        )?;
        for (position, delegate) in delegates.iter().enumerate() {
            tx.execute(
                "INSERT INTO delegations (granter, position, delegate) VALUES (?1, ?2, ?3)",
                params![granter.as_str(), position as i64, delegate.as_str()],
            )?;
        }
    }

    for template in &changes.templates {
        let exists: Option<String> = tx
            .query_row(
                "SELECT name FROM templates WHERE name = ?1",
                params![template.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!("template {}", template.name)));
        }
        tx.execute(
            "INSERT INTO templates (name, categories, duration, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                template.name,
                encode_categories(template.categories.as_slice())?,
                to_sql_u64(template.duration),
                template.description,
            ],
        )?;
    }

    for (key, history) in &changes.history {
        let key_params = [key.granter.as_str(), key.grantee.as_str(), key.category.as_str()];
        tx.execute(
            "DELETE FROM history WHERE granter = ?1 AND grantee = ?2 AND category = ?3",
            params![key_params[0], key_params[1], key_params[2]],
        )?;
        for entry in history.entries.iter() {
            tx.execute(
                "INSERT INTO history
                 (granter, grantee, category, seq, at, action, details, prev_digest, digest)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key_params[0],
                    key_params[1],
                    key_params[2],
                    to_sql_u64(entry.seq),
                    to_sql_u64(entry.at),
                    entry.action.code(),
                    entry.details,
                    entry.prev_digest.as_bytes().as_slice(),
                    entry.digest.as_bytes().as_slice(),
                ],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO history_heads
             (granter, grantee, category, next_seq, head)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key_params[0],
                key_params[1],
                key_params[2],
                to_sql_u64(history.next_seq),
                history.head.as_bytes().as_slice(),
            ],
        )?;
    }

    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_snapshot(&self) -> Result<EngineSnapshot> {
        self.run(|conn| {
            let snapshot = EngineSnapshot {
                consents: read_consents(conn)?,
                categories: read_categories(conn)?,
                categories_initialized: read_initialized(conn)?,
                delegations: read_delegations(conn)?,
                templates: read_templates(conn)?,
                history: read_all_history(conn)?,
            };
            tracing::debug!(
                consents = snapshot.consents.len(),
                histories = snapshot.history.len(),
                "loaded snapshot from sqlite"
            );
            Ok(snapshot)
        })
        .await
    }

    async fn apply(&self, changes: &Changeset) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let changes = changes.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            write_changeset(&tx, &changes)?;
            tx.commit()?;
            tracing::debug!(rows = changes.len(), "committed changeset to sqlite");
            Ok(())
        })
        .await
    }

    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<Consent>> {
        let key = key.clone();
        self.run(move |conn| read_consent(conn, &key)).await
    }

    async fn get_history(&self, key: &ConsentKey) -> Result<Option<History>> {
        let key = key.clone();
        self.run(move |conn| read_history(conn, &key)).await
    }

    async fn get_delegates(&self, granter: &Principal) -> Result<Vec<Principal>> {
        let granter = granter.clone();
        self.run(move |conn| read_delegates(conn, &granter)).await
    }

    async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        let name = name.to_owned();
        self.run(move |conn| read_template(conn, &name)).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.run(|conn| read_categories(conn)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_kernel_core::{Call, Engine};

    fn p(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    fn c(label: &str) -> Category {
        Category::new(label).unwrap()
    }

    fn sample_engine() -> Engine {
        let mut engine = Engine::default();
        let call = Call::new(p("u1"), 1);
        engine.add_delegate(&call, p("b")).unwrap();
        engine.add_delegate(&call, p("a")).unwrap();
        engine
            .grant(&call, &p("u1"), &p("u2"), &c("allergies"), 10, Some("note"))
            .unwrap();
        engine
            .renew(&call, &p("u1"), &p("u2"), &c("allergies"), u64::MAX - 11)
            .unwrap();
        engine
            .create_template(&call, "basic", vec![c("imaging"), c("genetics")], 5, "desc")
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let snapshot = sample_engine().snapshot();
        store.apply(&Changeset::from(snapshot.clone())).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded, snapshot);
        // u64 heights above i64::MAX survive the round trip.
        assert_eq!(loaded.consents[0].1.expiry, u64::MAX);
    }

    #[tokio::test]
    async fn test_delegate_order_preserved() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .apply(&Changeset::from(sample_engine().snapshot()))
            .await
            .unwrap();
        assert_eq!(
            store.get_delegates(&p("u1")).await.unwrap(),
            vec![p("b"), p("a")]
        );
    }

    #[tokio::test]
    async fn test_point_reads() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .apply(&Changeset::from(sample_engine().snapshot()))
            .await
            .unwrap();

        let key = ConsentKey::new(p("u1"), p("u2"), c("allergies"));
        let consent = store.get_consent(&key).await.unwrap().unwrap();
        assert!(consent.active);
        let history = store.get_history(&key).await.unwrap().unwrap();
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.next_seq, 2);

        let template = store.get_template("basic").await.unwrap().unwrap();
        assert_eq!(template.categories.to_vec(), vec![c("imaging"), c("genetics")]);
        assert!(store.get_template("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_apply_is_rolled_back() {
        let store = SqliteStore::open_memory().unwrap();
        let changes = Changeset::from(sample_engine().snapshot());
        store.apply(&changes).await.unwrap();

        let mut again = Changeset::default();
        again.categories.push(c("dental"));
        again.templates = changes.templates.clone();
        assert!(matches!(
            store.apply(&again).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(!store
            .list_categories()
            .await
            .unwrap()
            .contains(&c("dental")));
    }

    #[tokio::test]
    async fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consent.db");
        let snapshot = sample_engine().snapshot();
        {
            let store = SqliteStore::open(&path).unwrap();
            store.apply(&Changeset::from(snapshot.clone())).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load_snapshot().await.unwrap(), snapshot);
    }
}
