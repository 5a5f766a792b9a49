//! Authorization gate and account operations.
//!
//! - [`AuthorizationGate`] decides whether a credential may act on a site.
//! - [`Accounts`] creates sites and users, logs in and out, and runs the
//!   password-reset flow.

mod accounts;
mod gate;
pub mod password;

pub use accounts::{Accounts, NewUser};
pub use gate::{AuthorizationGate, Decision, DenyReason, Rejection, credential_token};

use thiserror::Error;

use crate::db::DbError;
use crate::fields::FieldErrors;

#[derive(Debug, Error)]
pub enum AuthError {
    /// User input failed validation; one entry per offending field.
    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),

    #[error("incorrect login credentials")]
    InvalidCredentials,

    #[error("invalid or expired reset token")]
    InvalidResetToken,

    #[error("no such user: {0}")]
    UnknownUser(String),

    #[error("password hashing: {0}")]
    Hash(String),

    #[error("storage failure: {0}")]
    Storage(#[from] DbError),
}
