//! Single-file backend: the document tree is flattened into one row per
//! leaf (`users/u1/role` -> `"teacher"`), accounts live in their own table.

use super::{normalize, AuthSession, PushKeyGenerator, Store, StorePath};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "studygroup.sqlite3";

pub struct LocalStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    current_uid: Mutex<Option<String>>,
    keys: PushKeyGenerator,
}

impl LocalStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::Transport(format!(
                "cannot create store directory {}: {}",
                dir.to_string_lossy(),
                e
            ))
        })?;
        let db_path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)?;
        Self::init(conn, Some(db_path))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes(
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts(
                uid TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                email_key TEXT NOT NULL UNIQUE,
                salt TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            current_uid: Mutex::new(None),
            keys: PushKeyGenerator::new(),
        })
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn current_uid(&self) -> Option<String> {
        lock(&self.current_uid).clone()
    }

    fn read_tree(&self, path: &StorePath) -> Result<Option<Value>> {
        let conn = lock(&self.conn);
        let rows: Vec<(String, String)> = if path.is_root() {
            let mut stmt = conn.prepare("SELECT path, value FROM nodes")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let exact = path.to_string();
            let prefix = format!("{}/", exact);
            let mut stmt = conn.prepare(
                "SELECT path, value FROM nodes WHERE path = ?1 OR substr(path, 1, ?2) = ?3",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![exact, prefix.chars().count() as i64, prefix],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        assemble(path, rows)
    }

    fn write_tree(&self, path: &StorePath, value: Option<Value>) -> Result<()> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        if path.is_root() {
            tx.execute("DELETE FROM nodes", [])?;
        } else {
            let exact = path.to_string();
            let prefix = format!("{}/", exact);
            tx.execute(
                "DELETE FROM nodes WHERE path = ?1 OR substr(path, 1, ?2) = ?3",
                rusqlite::params![exact, prefix.chars().count() as i64, prefix],
            )?;
        }
        if let Some(v) = value {
            // A scalar ancestor would shadow the new subtree.
            for anc in path.ancestors() {
                tx.execute("DELETE FROM nodes WHERE path = ?1", [anc.to_string()])?;
            }
            let mut leaves = Vec::new();
            flatten(path.to_string(), &v, &mut leaves);
            let mut stmt = tx.prepare("INSERT INTO nodes(path, value) VALUES(?1, ?2)")?;
            for (p, leaf) in leaves {
                stmt.execute(rusqlite::params![p, serde_json::to_string(&leaf)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl Store for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(AppError::Auth("INVALID_EMAIL".into()));
        }
        if password.chars().count() < 6 {
            return Err(AppError::Auth(
                "WEAK_PASSWORD : Password should be at least 6 characters".into(),
            ));
        }
        let uid = Uuid::new_v4().simple().to_string();
        let salt = random_salt();
        {
            let conn = lock(&self.conn);
            let taken: Option<String> = conn
                .query_row(
                    "SELECT uid FROM accounts WHERE email_key = ?1",
                    [email.to_lowercase()],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(AppError::Auth("EMAIL_EXISTS".into()));
            }
            conn.execute(
                "INSERT INTO accounts(uid, email, email_key, salt, password_hash, created_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    uid,
                    email,
                    email.to_lowercase(),
                    salt,
                    hash_password(&salt, password),
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
        }
        *lock(&self.current_uid) = Some(uid.clone());
        Ok(AuthSession {
            uid,
            email: email.to_string(),
            id_token: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = email.trim();
        let row: Option<(String, String, String, String)> = {
            let conn = lock(&self.conn);
            conn.query_row(
                "SELECT uid, email, salt, password_hash FROM accounts WHERE email_key = ?1",
                [email.to_lowercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
        };
        let Some((uid, stored_email, salt, hash)) = row else {
            return Err(AppError::Auth("INVALID_LOGIN_CREDENTIALS".into()));
        };
        if hash_password(&salt, password) != hash {
            return Err(AppError::Auth("INVALID_LOGIN_CREDENTIALS".into()));
        }
        *lock(&self.current_uid) = Some(uid.clone());
        Ok(AuthSession {
            uid,
            email: stored_email,
            id_token: None,
        })
    }

    fn sign_out(&self) {
        *lock(&self.current_uid) = None;
    }

    async fn delete_account(&self, account: &AuthSession) -> Result<()> {
        lock(&self.conn).execute("DELETE FROM accounts WHERE uid = ?1", [&account.uid])?;
        let mut current = lock(&self.current_uid);
        if current.as_deref() == Some(account.uid.as_str()) {
            *current = None;
        }
        Ok(())
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        self.read_tree(path)
    }

    async fn set(&self, path: &StorePath, value: &Value) -> Result<()> {
        self.write_tree(path, normalize(value))
    }

    async fn remove(&self, path: &StorePath) -> Result<()> {
        self.write_tree(path, None)
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn assemble(path: &StorePath, rows: Vec<(String, String)>) -> Result<Option<Value>> {
    if rows.is_empty() {
        return Ok(None);
    }
    let base_len = path.segments().len();
    let mut root = Value::Object(serde_json::Map::new());
    for (p, raw) in rows {
        let leaf: Value = serde_json::from_str(&raw)?;
        let rel: Vec<&str> = p.split('/').skip(base_len).collect();
        if rel.is_empty() {
            return Ok(Some(leaf));
        }
        let mut node = &mut root;
        for (i, seg) in rel.iter().enumerate() {
            let Value::Object(map) = node else {
                break;
            };
            if i + 1 == rel.len() {
                map.insert(seg.to_string(), leaf);
                break;
            }
            node = map
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
    }
    Ok(Some(root))
}

fn flatten(prefix: String, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let p = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}/{}", prefix, k)
                };
                flatten(p, v, out);
            }
        }
        leaf => out.push((prefix, leaf.clone())),
    }
}

fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut h = Sha256::new();
    h.update(salt.as_bytes());
    h.update(password.as_bytes());
    format!("{:x}", h.finalize())
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !s.contains(' '),
        None => false,
    }
}
