//! Sites, users, login/logout and password reset.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{error, info};

use quire_types::{SiteId, SitePrefix, UserId};

use super::AuthError;
use super::password::{MIN_PASSWORD_LEN, hash_password, verify_password};
use crate::cookie::{self, AUTHENTICATION_TOKEN, Cookie};
use crate::db::{AuthDb, DbError, UserRecord};
use crate::fields::FieldErrors;
use crate::token::Token;

const MAX_NAME_LEN: usize = 30;

/// Input for [`Accounts::create_user`].
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    /// Also make the user a member of the default site.
    pub default_site_member: bool,
}

/// Problems with a site or user name: lowercase letters, digits and
/// hyphens only, at most 30 characters, no leading or trailing hyphen.
/// Site names may also contain dots (custom domains).
fn validate_site_name(name: &str, allow_dots: bool) -> Vec<String> {
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push("cannot be empty".to_string());
        return errors;
    }
    if name.chars().count() > MAX_NAME_LEN {
        errors.push(format!("cannot exceed {MAX_NAME_LEN} characters"));
    }
    let allowed = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || (allow_dots && c == '.')
    };
    if !name.chars().all(allowed) {
        errors.push(if allow_dots {
            "only lowercase letters, numbers, hyphen and dot allowed".to_string()
        } else {
            "only lowercase letters, numbers and hyphen allowed".to_string()
        });
    }
    if name.starts_with('-') || name.ends_with('-') {
        errors.push("cannot start or end with hyphen".to_string());
    }
    errors
}

fn validate_password(errors: &mut FieldErrors, password: &str, confirm: Option<&str>) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }
    if let Some(confirm) = confirm
        && confirm != password
    {
        errors.add("confirm_password", "passwords do not match");
    }
}

/// Account operations over the relational store.
#[derive(Debug, Clone)]
pub struct Accounts {
    db: Arc<AuthDb>,
    secure: bool,
    reset_token_ttl: Duration,
}

impl Accounts {
    pub fn new(db: Arc<AuthDb>) -> Self {
        Self {
            db,
            secure: false,
            reset_token_ttl: Duration::from_secs(3600),
        }
    }

    /// Mark issued cookies `Secure`.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn reset_token_ttl(mut self, ttl: Duration) -> Self {
        self.reset_token_ttl = ttl;
        self
    }

    pub fn db(&self) -> &Arc<AuthDb> {
        &self.db
    }

    pub fn create_site(&self, site_name: &str) -> Result<SiteId, AuthError> {
        let mut errors = FieldErrors::new();
        errors.extend("site_name", validate_site_name(site_name, true));
        errors.into_result().map_err(AuthError::ValidationFailed)?;

        match self.db.create_site(site_name) {
            Ok(id) => {
                info!(site = %SitePrefix::from_site_name(site_name), "created site");
                Ok(id)
            }
            Err(DbError::KeyViolation(_)) => {
                let mut errors = FieldErrors::new();
                errors.add("site_name", "site name already used");
                Err(AuthError::ValidationFailed(errors))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a user together with their own `@username` site.
    pub fn create_user(&self, new: &NewUser) -> Result<UserId, AuthError> {
        let mut errors = FieldErrors::new();
        errors.extend("username", validate_site_name(&new.username, false));
        if let Some(email) = &new.email
            && !email.contains('@')
        {
            errors.add("email", "invalid email address");
        }
        validate_password(&mut errors, &new.password, None);
        if errors.is_empty() && self.db.site_id(&new.username)?.is_some() {
            errors.add("username", "username already used");
        }
        errors.into_result().map_err(AuthError::ValidationFailed)?;

        let password_hash = hash_password(&new.password)?;
        let created = self.db.create_user_with_site(
            &new.username,
            new.email.as_deref(),
            &password_hash,
            new.default_site_member,
        );
        let user_id = match created {
            Ok((user_id, _)) => user_id,
            Err(DbError::KeyViolation(what)) => {
                let message = if what == "site" {
                    "username already used"
                } else {
                    "username or email already used"
                };
                let mut errors = FieldErrors::new();
                errors.add("username", message);
                return Err(AuthError::ValidationFailed(errors));
            }
            Err(e) => return Err(e.into()),
        };
        info!(username = %new.username, user = ?user_id, "created user");
        Ok(user_id)
    }

    /// Find a user by `username`, `@username` or email address.
    fn find_user(&self, identifier: &str) -> Result<Option<UserRecord>, AuthError> {
        let identifier = identifier.trim();
        let user = if let Some(username) = identifier.strip_prefix('@') {
            self.db.user_by_username(username)?
        } else if identifier.contains('@') {
            self.db.user_by_email(identifier)?
        } else {
            self.db.user_by_username(identifier)?
        };
        Ok(user)
    }

    /// Check credentials and issue an `authentication_token` cookie.
    pub fn login(&self, identifier: &str, password: &str) -> Result<Cookie<'static>, AuthError> {
        let Some(user) = self.find_user(identifier)? else {
            return Err(AuthError::InvalidCredentials);
        };
        let verified = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(password, hash));
        if !verified {
            return Err(AuthError::InvalidCredentials);
        }

        let (token, hash) = Token::generate();
        self.db.insert_authentication(&hash, user.user_id)?;
        info!(username = %user.username, "logged in");
        Ok(cookie::issue(AUTHENTICATION_TOKEN, token.encode(), self.secure))
    }

    /// Drop the authentication record for `token`, if any, and expire the
    /// cookie. Idempotent.
    pub fn logout(&self, token: Option<&Token>) -> Result<Cookie<'static>, AuthError> {
        if let Some(token) = token
            && self.db.delete_authentication(&token.hash())?
        {
            info!("logged out");
        }
        Ok(cookie::removal(AUTHENTICATION_TOKEN, self.secure))
    }

    /// Store a fresh reset token hash on the user row and return the
    /// encoded token for delivery.
    pub fn issue_reset_token(&self, identifier: &str) -> Result<String, AuthError> {
        let user = self
            .find_user(identifier)?
            .ok_or_else(|| AuthError::UnknownUser(identifier.to_string()))?;
        let (token, hash) = Token::generate();
        self.db.set_reset_token(user.user_id, &hash)?;
        info!(username = %user.username, "issued password reset token");
        Ok(token.encode())
    }

    /// Set a new password using a reset token.
    ///
    /// On success every authentication token of the user is revoked.
    pub fn reset_password(
        &self,
        reset_token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<UserId, AuthError> {
        self.reset_password_at(reset_token, password, confirm_password, SystemTime::now())
    }

    pub fn reset_password_at(
        &self,
        reset_token: &str,
        password: &str,
        confirm_password: &str,
        now: SystemTime,
    ) -> Result<UserId, AuthError> {
        let hash = Token::decode(reset_token.trim())
            .map_err(|_| AuthError::InvalidResetToken)?
            .hash();
        if hash.is_expired_at(now, self.reset_token_ttl) {
            return Err(AuthError::InvalidResetToken);
        }
        let user_id = self
            .db
            .user_by_reset_token(&hash)?
            .ok_or(AuthError::InvalidResetToken)?;

        let mut errors = FieldErrors::new();
        validate_password(&mut errors, password, Some(confirm_password));
        errors.into_result().map_err(AuthError::ValidationFailed)?;

        let password_hash = hash_password(password)?;
        self.db
            .reset_password(user_id, &password_hash)
            .inspect_err(|e| error!(user = ?user_id, error = %e, "password reset failed"))?;
        info!(user = ?user_id, "password reset");
        Ok(user_id)
    }
}
