//! Database dialects and the driver registry.
//!
//! The registry is built once at startup and handed to
//! [`AuthDb::connect`](crate::db::AuthDb::connect). Overriding a driver
//! means registering different capabilities for its dialect before
//! connecting.

use std::collections::HashMap;

use strum::{Display, EnumString};

use crate::db::DbError;

/// SQL dialects a DSN can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
    Sqlserver,
}

/// What the core needs to know about a driver.
#[derive(Debug, Clone)]
pub struct DriverCapabilities {
    pub driver_name: &'static str,
    /// Rewrites the configured DSN into the form the driver opens.
    pub preprocess_dsn: fn(&str) -> String,
    /// Error codes meaning "unique or primary key violated".
    pub key_violation_codes: &'static [&'static str],
    /// Error codes meaning "foreign key violated".
    pub foreign_key_violation_codes: &'static [&'static str],
}

impl DriverCapabilities {
    pub fn is_key_violation(&self, code: &str) -> bool {
        self.key_violation_codes.contains(&code)
    }

    pub fn is_foreign_key_violation(&self, code: &str) -> bool {
        self.foreign_key_violation_codes.contains(&code)
    }
}

fn strip_sqlite_scheme(dsn: &str) -> String {
    let rest = dsn
        .strip_prefix("sqlite3:")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn);
    rest.strip_prefix("//").unwrap_or(rest).to_string()
}

fn strip_mysql_scheme(dsn: &str) -> String {
    dsn.strip_prefix("mysql://").unwrap_or(dsn).to_string()
}

fn identity(dsn: &str) -> String {
    dsn.to_string()
}

/// SQLite extended result codes: SQLITE_CONSTRAINT_UNIQUE,
/// SQLITE_CONSTRAINT_PRIMARYKEY and SQLITE_CONSTRAINT_FOREIGNKEY.
pub const SQLITE: DriverCapabilities = DriverCapabilities {
    driver_name: "sqlite3",
    preprocess_dsn: strip_sqlite_scheme,
    key_violation_codes: &["2067", "1555"],
    foreign_key_violation_codes: &["787"],
};

pub const POSTGRES: DriverCapabilities = DriverCapabilities {
    driver_name: "postgres",
    preprocess_dsn: identity,
    key_violation_codes: &["23505"],
    foreign_key_violation_codes: &["23503"],
};

pub const MYSQL: DriverCapabilities = DriverCapabilities {
    driver_name: "mysql",
    preprocess_dsn: strip_mysql_scheme,
    key_violation_codes: &["1062"],
    foreign_key_violation_codes: &["1216", "1452"],
};

/// Explicit dialect → driver map.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<Dialect, DriverCapabilities>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in SQLite, Postgres and MySQL entries.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Dialect::Sqlite, SQLITE)
            .register(Dialect::Postgres, POSTGRES)
            .register(Dialect::Mysql, MYSQL)
    }

    /// Add or replace the driver for `dialect`.
    pub fn register(mut self, dialect: Dialect, caps: DriverCapabilities) -> Self {
        self.drivers.insert(dialect, caps);
        self
    }

    pub fn get(&self, dialect: Dialect) -> Option<&DriverCapabilities> {
        self.drivers.get(&dialect)
    }
}

const SQLITE_EXTENSIONS: [&str; 4] = [".sqlite", ".sqlite3", ".db", ".db3"];

/// Work out the dialect a DSN names.
pub fn detect_dialect(dsn: &str) -> Result<Dialect, DbError> {
    let dsn = dsn.trim();
    if dsn == "sqlite"
        || dsn == ":memory:"
        || dsn.starts_with("sqlite:")
        || dsn.starts_with("sqlite3:")
        || dsn.starts_with("file:")
        || SQLITE_EXTENSIONS.iter().any(|ext| dsn.ends_with(ext))
    {
        return Ok(Dialect::Sqlite);
    }
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return Ok(Dialect::Postgres);
    }
    if dsn.starts_with("mysql://") || dsn.contains("@tcp(") || dsn.contains("@unix(") {
        return Ok(Dialect::Mysql);
    }
    if dsn.starts_with("sqlserver://") {
        return Ok(Dialect::Sqlserver);
    }
    Err(DbError::UnknownDsn(dsn.to_string()))
}
