//! # quire-kernel
//!
//! Core crate for quire: the content store and the credentials in front
//! of it.
//!
//! - [`vfs`]: storage abstraction with all-or-nothing writes, over local
//!   disk or memory
//! - [`token`]: opaque bearer tokens and their persisted hashes
//! - [`session`]: read-once flash sessions, cookie-only or database-backed
//! - [`auth`]: the per-site authorization gate, login/logout, password reset
//! - [`content`]: create, rename, move, copy, delete and list content
//!
//! Without a database the kernel runs single-tenant and authless.

pub mod auth;
pub mod config;
pub mod content;
pub mod cookie;
pub mod db;
pub mod driver;
pub mod fields;
pub mod request;
pub mod session;
pub mod token;
pub mod vfs;

pub use auth::{Accounts, AuthError, AuthorizationGate, Decision, DenyReason, NewUser};
pub use config::{ConfigError, MultisiteMode, QuireConfig};
pub use content::{ContentError, ContentOperations, SiteContent};
pub use crate::cookie::{AUTHENTICATION_TOKEN, Cookie, Cookies, FLASH_SESSION};
pub use db::{AuthDb, DbError};
pub use driver::{Dialect, DriverCapabilities, DriverRegistry, detect_dialect};
pub use fields::FieldErrors;
pub use session::{MemorySessions, SessionBackend, SessionError, SessionStore};
pub use token::{Token, TokenError, TokenHash};
pub use vfs::{LocalBackend, MemoryBackend, VfsError, VfsOps};
