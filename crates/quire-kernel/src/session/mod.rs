//! Read-once flash sessions.
//!
//! Without a backend the JSON payload rides in the cookie itself
//! (base64url). With one, the cookie carries an opaque [`Token`] and the
//! payload is stored under the token's hash, expiring after the TTL that
//! the token's own timestamp measures.
//!
//! Lookups soft-fail: a missing, malformed or expired cookie reads as
//! "no session", never as an error.

mod backend;

pub use backend::{MemorySessions, SessionBackend};

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::cookie::{self, Cookie, Cookies};
use crate::db::DbError;
use crate::token::{Token, unix_seconds};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("serializing session payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session storage: {0}")]
    Storage(#[from] DbError),
}

/// Flash-session store.
#[derive(Clone)]
pub struct SessionStore {
    backend: Option<Arc<dyn SessionBackend>>,
    ttl: Duration,
    secure: bool,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("stateless", &self.is_stateless())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionStore {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    /// Payloads travel inside the cookie.
    pub fn stateless() -> Self {
        Self {
            backend: None,
            ttl: Self::DEFAULT_TTL,
            secure: false,
        }
    }

    /// Payloads are stored in `backend` under the token hash.
    pub fn with_backend(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::stateless()
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Mark issued cookies `Secure`.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn is_stateless(&self) -> bool {
        self.backend.is_none()
    }

    /// Store `payload` and return `template` with its value filled in.
    pub fn put<T: Serialize>(
        &self,
        payload: &T,
        mut template: Cookie<'static>,
    ) -> Result<Cookie<'static>, SessionError> {
        let json = serde_json::to_vec(payload)?;
        let value = match &self.backend {
            None => URL_SAFE.encode(&json),
            Some(backend) => {
                let now = SystemTime::now();
                let swept = backend.sweep(unix_seconds(now).saturating_sub(self.ttl.as_secs()))?;
                if swept > 0 {
                    debug!(rows = swept, "swept expired sessions");
                }
                let (token, hash) = Token::generate_at(now);
                backend.put(&hash, &json)?;
                token.encode()
            }
        };
        template.set_value(value);
        template.set_secure(self.secure);
        Ok(template)
    }

    /// Look up the payload carried by cookie `name`.
    pub fn get<T: DeserializeOwned>(
        &self,
        cookies: &Cookies,
        name: &str,
    ) -> Result<Option<T>, SessionError> {
        self.get_at(cookies, name, SystemTime::now())
    }

    /// [`get`](Self::get) with an explicit clock.
    pub fn get_at<T: DeserializeOwned>(
        &self,
        cookies: &Cookies,
        name: &str,
        now: SystemTime,
    ) -> Result<Option<T>, SessionError> {
        let Some(value) = cookies.get(name) else {
            return Ok(None);
        };

        let json = match &self.backend {
            None => match URL_SAFE.decode(value) {
                Ok(json) => json,
                Err(e) => {
                    debug!(cookie = name, error = %e, "undecodable stateless session");
                    return Ok(None);
                }
            },
            Some(backend) => {
                let hash = match Token::decode(value) {
                    Ok(token) => token.hash(),
                    Err(e) => {
                        debug!(cookie = name, error = %e, "undecodable session token");
                        return Ok(None);
                    }
                };
                if hash.is_expired_at(now, self.ttl) {
                    debug!(cookie = name, age = ?hash.age_at(now), "expired session token");
                    backend.delete(&hash)?;
                    return Ok(None);
                }
                match backend.get(&hash)? {
                    Some(json) => json,
                    None => return Ok(None),
                }
            }
        };

        match serde_json::from_slice(&json) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                debug!(cookie = name, error = %e, "unparseable session payload");
                Ok(None)
            }
        }
    }

    /// Expire cookie `name` and drop its stored row, if any. Idempotent.
    pub fn clear(&self, cookies: &Cookies, name: &str) -> Result<Cookie<'static>, SessionError> {
        if let Some(backend) = &self.backend
            && let Some(value) = cookies.get(name)
            && let Ok(token) = Token::decode(value)
        {
            backend.delete(&token.hash())?;
        }
        Ok(cookie::removal(name.to_string(), self.secure))
    }

    /// Read-once: look up the payload, then clear it whatever the outcome.
    pub fn take<T: DeserializeOwned>(
        &self,
        cookies: &Cookies,
        name: &str,
    ) -> Result<(Option<T>, Cookie<'static>), SessionError> {
        let payload = self.get(cookies, name);
        let cleared = self.clear(cookies, name)?;
        Ok((payload?, cleared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::{FLASH_SESSION, is_removal, issue};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Flash {
        created: Vec<String>,
    }

    fn flash() -> Flash {
        Flash {
            created: vec!["posts/hello.md".into()],
        }
    }

    fn jar_with(cookie: &Cookie<'static>) -> Cookies {
        let mut jar = Cookies::default();
        jar.apply(cookie);
        jar
    }

    #[test]
    fn test_stateless_roundtrip() {
        let store = SessionStore::stateless();
        let cookie = store.put(&flash(), issue(FLASH_SESSION, "", false)).unwrap();
        let jar = jar_with(&cookie);

        let got: Option<Flash> = store.get(&jar, FLASH_SESSION).unwrap();
        assert_eq!(got, Some(flash()));
    }

    #[test]
    fn test_stateful_roundtrip() {
        let backend = Arc::new(MemorySessions::new());
        let store = SessionStore::with_backend(backend.clone());
        let cookie = store.put(&flash(), issue(FLASH_SESSION, "", false)).unwrap();
        assert_eq!(backend.len(), 1);
        assert!(Token::decode(cookie.value()).is_ok());

        let jar = jar_with(&cookie);
        let got: Option<Flash> = store.get(&jar, FLASH_SESSION).unwrap();
        assert_eq!(got, Some(flash()));
    }

    #[test]
    fn test_expired_token_reads_as_missing() {
        let backend = Arc::new(MemorySessions::new());
        let store = SessionStore::with_backend(backend.clone());
        let now = SystemTime::now();

        let (old, old_hash) = Token::generate_at(now - Duration::from_secs(301));
        backend.put(&old_hash, br#"{"created":[]}"#).unwrap();
        let jar = jar_with(&issue(FLASH_SESSION, old.encode(), false));
        let got: Option<Flash> = store.get_at(&jar, FLASH_SESSION, now).unwrap();
        assert_eq!(got, None);
        assert!(backend.is_empty());

        let (fresh, fresh_hash) = Token::generate_at(now - Duration::from_secs(299));
        backend.put(&fresh_hash, br#"{"created":[]}"#).unwrap();
        let jar = jar_with(&issue(FLASH_SESSION, fresh.encode(), false));
        let got: Option<Flash> = store.get_at(&jar, FLASH_SESSION, now).unwrap();
        assert_eq!(got, Some(Flash { created: vec![] }));
    }

    #[test]
    fn test_put_sweeps_expired_rows() {
        let backend = Arc::new(MemorySessions::new());
        let store = SessionStore::with_backend(backend.clone());
        let now = SystemTime::now();
        let (_, stale) = Token::generate_at(now - Duration::from_secs(3600));
        let (_, live) = Token::generate_at(now - Duration::from_secs(60));
        backend.put(&stale, b"{}").unwrap();
        backend.put(&live, b"{}").unwrap();

        store.put(&flash(), issue(FLASH_SESSION, "", false)).unwrap();
        assert_eq!(backend.len(), 2);
        assert!(backend.get(&stale).unwrap().is_none());
        assert!(backend.get(&live).unwrap().is_some());
    }

    #[test]
    fn test_put_sweeps_database_rows() {
        let db = Arc::new(crate::db::AuthDb::in_memory().unwrap());
        let store = SessionStore::with_backend(db.clone());
        let (_, stale) = Token::generate_at(SystemTime::now() - Duration::from_secs(3600));
        db.put_session(&stale, b"{}").unwrap();

        let cookie = store.put(&flash(), issue(FLASH_SESSION, "", false)).unwrap();
        assert!(db.get_session(&stale).unwrap().is_none());
        let got: Option<Flash> = store.get(&jar_with(&cookie), FLASH_SESSION).unwrap();
        assert_eq!(got, Some(flash()));
    }

    #[test]
    fn test_garbage_soft_fails() {
        let stateful = SessionStore::with_backend(Arc::new(MemorySessions::new()));
        let stateless = SessionStore::stateless();
        let jar = Cookies::parse("flash_session=%%%not-a-token");

        assert!(stateful.get::<Flash>(&jar, FLASH_SESSION).unwrap().is_none());
        assert!(stateless.get::<Flash>(&jar, FLASH_SESSION).unwrap().is_none());
        assert!(stateless.get::<Flash>(&Cookies::default(), FLASH_SESSION).unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let backend = Arc::new(MemorySessions::new());
        let store = SessionStore::with_backend(backend.clone());
        let cookie = store.put(&flash(), issue(FLASH_SESSION, "", false)).unwrap();
        let mut jar = jar_with(&cookie);

        let first = store.clear(&jar, FLASH_SESSION).unwrap();
        let after_once = backend.len();
        let second = store.clear(&jar, FLASH_SESSION).unwrap();
        jar.apply(&first);
        let third = store.clear(&jar, FLASH_SESSION).unwrap();

        assert_eq!(after_once, 0);
        assert_eq!(backend.len(), 0);
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert!(is_removal(&first));
        assert_eq!(first.value(), "");
    }

    #[test]
    fn test_take_is_read_once() {
        let backend = Arc::new(MemorySessions::new());
        let store = SessionStore::with_backend(backend.clone());
        let cookie = store.put(&flash(), issue(FLASH_SESSION, "", false)).unwrap();
        let jar = jar_with(&cookie);

        let (got, cleared) = store.take::<Flash>(&jar, FLASH_SESSION).unwrap();
        assert_eq!(got, Some(flash()));
        assert!(is_removal(&cleared));

        // Same cookie replayed: row is gone.
        let (again, _) = store.take::<Flash>(&jar, FLASH_SESSION).unwrap();
        assert_eq!(again, None);
    }
}
