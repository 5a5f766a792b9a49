//! Relational store for sites, users, authentication and session rows.
//!
//! Only parameterized lookups, inserts and deletes live here. Credential
//! checks and token handling are in [`crate::auth`] and
//! [`crate::session`].

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use quire_types::{SiteId, UserId};

use crate::driver::{self, Dialect, DriverCapabilities, DriverRegistry};
use crate::token::TokenHash;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unknown dsn: {0:?}")]
    UnknownDsn(String),

    #[error("{0} databases are not supported by this build")]
    Unsupported(Dialect),

    #[error("no driver registered for {0}")]
    NoDriver(Dialect),

    #[error("duplicate {0}")]
    KeyViolation(&'static str),

    #[error("{0} refers to a missing row")]
    ForeignKeyViolation(&'static str),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// A user row.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

const SCHEMA: &str = r#"
-- Sites (tenants). The default site has the empty name.
CREATE TABLE IF NOT EXISTS site (
    site_id TEXT PRIMARY KEY,
    site_name TEXT NOT NULL UNIQUE
);

-- Users
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT UNIQUE,
    password_hash TEXT,
    reset_token_hash BLOB UNIQUE
);

-- Site membership
CREATE TABLE IF NOT EXISTS site_user (
    site_id TEXT NOT NULL REFERENCES site (site_id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users (user_id) ON DELETE CASCADE,
    PRIMARY KEY (site_id, user_id)
);

-- Long-lived login tokens (hashes only)
CREATE TABLE IF NOT EXISTS authentication (
    authentication_token_hash BLOB PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users (user_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_authentication_user ON authentication (user_id);

-- Flash sessions (hashes only)
CREATE TABLE IF NOT EXISTS session (
    session_token_hash BLOB PRIMARY KEY,
    data BLOB NOT NULL
);
"#;

/// Handle to the relational store.
pub struct AuthDb {
    conn: Mutex<Connection>,
    caps: DriverCapabilities,
}

impl std::fmt::Debug for AuthDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDb")
            .field("driver", &self.caps.driver_name)
            .finish()
    }
}

fn error_code(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code.to_string()),
        _ => None,
    }
}

fn parse_user_id(s: String) -> DbResult<UserId> {
    UserId::parse(&s).map_err(|e| DbError::Corrupt(format!("user_id {s:?}: {e}")))
}

fn parse_site_id(s: String) -> DbResult<SiteId> {
    SiteId::parse(&s).map_err(|e| DbError::Corrupt(format!("site_id {s:?}: {e}")))
}

impl AuthDb {
    /// Open the database named by `dsn`, using the driver registered for
    /// its dialect.
    pub fn connect(dsn: &str, registry: &DriverRegistry) -> DbResult<Self> {
        let dialect = driver::detect_dialect(dsn)?;
        let caps = registry
            .get(dialect)
            .cloned()
            .ok_or(DbError::NoDriver(dialect))?;
        if dialect != Dialect::Sqlite {
            return Err(DbError::Unsupported(dialect));
        }
        let path = (caps.preprocess_dsn)(dsn.trim());
        debug!(driver = caps.driver_name, path = %path, "opening database");
        let conn = Connection::open(&path)?;
        Self::init(conn, caps)
    }

    /// Open or create a SQLite database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, driver::SQLITE)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, driver::SQLITE)
    }

    fn init(conn: Connection, caps: DriverCapabilities) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO site (site_id, site_name) VALUES (?1, '')",
            params![SiteId::from(uuid::Uuid::nil()).to_hex()],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            caps,
        })
    }

    /// Turn constraint failures into typed errors using the driver's codes.
    fn classify(&self, err: rusqlite::Error, what: &'static str) -> DbError {
        match error_code(&err) {
            Some(code) if self.caps.is_key_violation(&code) => DbError::KeyViolation(what),
            Some(code) if self.caps.is_foreign_key_violation(&code) => {
                DbError::ForeignKeyViolation(what)
            }
            _ => DbError::Sqlite(err),
        }
    }

    // ========================================================================
    // Sites
    // ========================================================================

    pub fn create_site(&self, site_name: &str) -> DbResult<SiteId> {
        let site_id = SiteId::new();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO site (site_id, site_name) VALUES (?1, ?2)",
            params![site_id.to_hex(), site_name],
        )
        .map_err(|e| self.classify(e, "site"))?;
        Ok(site_id)
    }

    pub fn site_id(&self, site_name: &str) -> DbResult<Option<SiteId>> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row(
                "SELECT site_id FROM site WHERE site_name = ?1",
                params![site_name],
                |row| row.get(0),
            )
            .optional()?;
        id.map(parse_site_id).transpose()
    }

    pub fn add_site_user(&self, site_id: SiteId, user_id: UserId) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO site_user (site_id, user_id) VALUES (?1, ?2)",
            params![site_id.to_hex(), user_id.to_hex()],
        )
        .map_err(|e| self.classify(e, "site membership"))?;
        Ok(())
    }

    /// Names of every site the user belongs to, sorted.
    pub fn site_names_for_user(&self, user_id: UserId) -> DbResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT site.site_name FROM site_user \
             JOIN site ON site.site_id = site_user.site_id \
             WHERE site_user.user_id = ?1 ORDER BY site.site_name",
        )?;
        let names = stmt
            .query_map(params![user_id.to_hex()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> DbResult<UserId> {
        let user_id = UserId::new();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (user_id, username, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![user_id.to_hex(), username, email, password_hash],
        )
        .map_err(|e| self.classify(e, "user"))?;
        Ok(user_id)
    }

    /// In one transaction: insert the user, their own site named after the
    /// username, the membership row and, if asked, membership of the
    /// default site. Nothing is left behind when any step fails.
    pub fn create_user_with_site(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        default_site_member: bool,
    ) -> DbResult<(UserId, SiteId)> {
        let user_id = UserId::new();
        let site_id = SiteId::new();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (user_id, username, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![user_id.to_hex(), username, email, password_hash],
        )
        .map_err(|e| self.classify(e, "user"))?;
        tx.execute(
            "INSERT INTO site (site_id, site_name) VALUES (?1, ?2)",
            params![site_id.to_hex(), username],
        )
        .map_err(|e| self.classify(e, "site"))?;
        tx.execute(
            "INSERT INTO site_user (site_id, user_id) VALUES (?1, ?2)",
            params![site_id.to_hex(), user_id.to_hex()],
        )?;
        if default_site_member {
            tx.execute(
                "INSERT INTO site_user (site_id, user_id) \
                 SELECT site_id, ?1 FROM site WHERE site_name = ''",
                params![user_id.to_hex()],
            )?;
        }
        tx.commit()?;
        Ok((user_id, site_id))
    }

    fn user_where(&self, clause: &str, value: &str) -> DbResult<Option<UserRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT user_id, username, email, password_hash FROM users WHERE {clause} = ?1"
        );
        let row = conn
            .query_row(&sql, params![value], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .optional()?;
        row.map(|(id, username, email, password_hash)| {
            Ok(UserRecord {
                user_id: parse_user_id(id)?,
                username,
                email,
                password_hash,
            })
        })
        .transpose()
    }

    pub fn user_by_username(&self, username: &str) -> DbResult<Option<UserRecord>> {
        self.user_where("username", username)
    }

    pub fn user_by_email(&self, email: &str) -> DbResult<Option<UserRecord>> {
        self.user_where("email", email)
    }

    // ========================================================================
    // Authentication tokens
    // ========================================================================

    pub fn insert_authentication(&self, hash: &TokenHash, user_id: UserId) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO authentication (authentication_token_hash, user_id) VALUES (?1, ?2)",
            params![&hash.as_bytes()[..], user_id.to_hex()],
        )
        .map_err(|e| self.classify(e, "authentication token"))?;
        Ok(())
    }

    /// Returns true if a row was deleted.
    pub fn delete_authentication(&self, hash: &TokenHash) -> DbResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM authentication WHERE authentication_token_hash = ?1",
            params![&hash.as_bytes()[..]],
        )?;
        Ok(n > 0)
    }

    pub fn user_for_authentication(&self, hash: &TokenHash) -> DbResult<Option<UserId>> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row(
                "SELECT user_id FROM authentication WHERE authentication_token_hash = ?1",
                params![&hash.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()?;
        id.map(parse_user_id).transpose()
    }

    /// The user holding `hash`, if that user is a member of `site_name`.
    pub fn authorized_user(&self, site_name: &str, hash: &TokenHash) -> DbResult<Option<UserId>> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row(
                "SELECT users.user_id FROM authentication \
                 JOIN site_user ON site_user.user_id = authentication.user_id \
                 JOIN site ON site.site_id = site_user.site_id \
                 JOIN users ON users.user_id = site_user.user_id \
                 WHERE authentication.authentication_token_hash = ?1 AND site.site_name = ?2",
                params![&hash.as_bytes()[..], site_name],
                |row| row.get(0),
            )
            .optional()?;
        id.map(parse_user_id).transpose()
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    pub fn set_reset_token(&self, user_id: UserId, hash: &TokenHash) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET reset_token_hash = ?1 WHERE user_id = ?2",
            params![&hash.as_bytes()[..], user_id.to_hex()],
        )?;
        Ok(())
    }

    pub fn user_by_reset_token(&self, hash: &TokenHash) -> DbResult<Option<UserId>> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row(
                "SELECT user_id FROM users WHERE reset_token_hash = ?1",
                params![&hash.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()?;
        id.map(parse_user_id).transpose()
    }

    /// In one transaction: drop every authentication token of the user,
    /// store the new password hash and clear the reset token.
    pub fn reset_password(&self, user_id: UserId, password_hash: &str) -> DbResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM authentication WHERE user_id = ?1",
            params![user_id.to_hex()],
        )?;
        tx.execute(
            "UPDATE users SET password_hash = ?1, reset_token_hash = NULL WHERE user_id = ?2",
            params![password_hash, user_id.to_hex()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Session rows
    // ========================================================================

    pub fn put_session(&self, hash: &TokenHash, data: &[u8]) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO session (session_token_hash, data) VALUES (?1, ?2)",
            params![&hash.as_bytes()[..], data],
        )
        .map_err(|e| self.classify(e, "session token"))?;
        Ok(())
    }

    pub fn get_session(&self, hash: &TokenHash) -> DbResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let data = conn
            .query_row(
                "SELECT data FROM session WHERE session_token_hash = ?1",
                params![&hash.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    /// Delete session rows whose token was issued before `cutoff` (Unix
    /// seconds). Returns the number of rows removed.
    pub fn delete_sessions_older_than(&self, cutoff: u64) -> DbResult<usize> {
        let conn = self.conn.lock();
        // Hashes start with the big-endian timestamp: blob order is age order.
        let n = conn.execute(
            "DELETE FROM session WHERE session_token_hash < ?1",
            params![&cutoff.to_be_bytes()[..]],
        )?;
        Ok(n)
    }

    pub fn delete_session(&self, hash: &TokenHash) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM session WHERE session_token_hash = ?1",
            params![&hash.as_bytes()[..]],
        )?;
        Ok(())
    }
}
