//! The allow/deny check in front of every administrative path.

use std::sync::Arc;

use strum::Display;
use tracing::{debug, error};

use quire_types::{SitePrefix, UserId};

use super::AuthError;
use crate::cookie::{AUTHENTICATION_TOKEN, Cookies};
use crate::db::AuthDb;
use crate::request::bearer_token;
use crate::token::Token;

/// Pull the authentication token out of a request.
///
/// An `Authorization: Bearer` header wins over the cookie. A value that
/// does not decode counts as no credential.
pub fn credential_token(cookies: &Cookies, authorization: Option<&str>) -> Option<Token> {
    let raw = bearer_token(authorization).or_else(|| cookies.get(AUTHENTICATION_TOKEN))?;
    match Token::decode(raw) {
        Ok(token) => Some(token),
        Err(e) => {
            debug!(error = %e, "ignoring undecodable authentication token");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DenyReason {
    /// No token was presented.
    NotAuthenticated,
    /// The token matches no authentication record.
    UnknownToken,
    /// The user is not a member of the site.
    NotAMember,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// `user` is `None` in authless mode.
    Allow { user: Option<UserId> },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// How a handler turns a denial into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Browser navigation: send to the login page, then back.
    RedirectToLogin(String),
    /// API clients: plain 403.
    Forbidden,
}

impl DenyReason {
    pub fn rejection(&self, wants_json: bool, return_to: &str) -> Rejection {
        if wants_json {
            Rejection::Forbidden
        } else {
            Rejection::RedirectToLogin(format!(
                "/admin/login/?redirect={}",
                urlencoding::encode(return_to)
            ))
        }
    }
}

/// Decides whether a credential may act on a site.
///
/// Without a database the system runs single-tenant and authless, and
/// every request is allowed.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    db: Option<Arc<AuthDb>>,
}

impl AuthorizationGate {
    pub fn authless() -> Self {
        Self { db: None }
    }

    pub fn new(db: Arc<AuthDb>) -> Self {
        Self { db: Some(db) }
    }

    pub fn is_authless(&self) -> bool {
        self.db.is_none()
    }

    pub fn authorize(&self, site: &SitePrefix, token: Option<&Token>) -> Result<Decision, AuthError> {
        let Some(db) = &self.db else {
            return Ok(Decision::Allow { user: None });
        };
        let Some(token) = token else {
            return Ok(Decision::Deny(DenyReason::NotAuthenticated));
        };
        let hash = token.hash();

        let member = db.authorized_user(site.site_name(), &hash).map_err(|e| {
            error!(site = %site, error = %e, "authorization lookup failed");
            e
        })?;
        if let Some(user) = member {
            return Ok(Decision::Allow { user: Some(user) });
        }

        let reason = match db.user_for_authentication(&hash)? {
            Some(_) => DenyReason::NotAMember,
            None => DenyReason::UnknownToken,
        };
        debug!(site = %site, %reason, "denied");
        Ok(Decision::Deny(reason))
    }

    /// The user behind `token`, if it is a live authentication token.
    pub fn authenticate(&self, token: &Token) -> Result<Option<UserId>, AuthError> {
        match &self.db {
            None => Ok(None),
            Some(db) => Ok(db.user_for_authentication(&token.hash())?),
        }
    }

    /// Site prefixes the user may administer, default site first.
    pub fn authorized_site_prefixes(&self, user: UserId) -> Result<Vec<SitePrefix>, AuthError> {
        let Some(db) = &self.db else {
            return Ok(Vec::new());
        };
        let names = db.site_names_for_user(user)?;
        Ok(names.iter().map(|n| SitePrefix::from_site_name(n)).collect())
    }
}
