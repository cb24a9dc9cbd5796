use std::fmt;
use thiserror::Error;

use crate::crypto::AuthCryptoError;
use crate::tokens::TokenError;
use crate::transport::TransportKind;

/// Fatal errors: construction of a session is aborted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The scope exists but is switched off.
    #[error("session scope `{0}` is not activated")]
    NotActivated(String),

    /// No scope is registered under the name.
    #[error("unknown session scope `{0}`")]
    UnknownScope(String),

    /// The host's record accessor returned an error.
    #[error("identity record accessor failed: {0}")]
    Accessor(#[source] anyhow::Error),

    /// The token store backend returned an error.
    #[error("token store failed: {0}")]
    TokenStore(#[source] anyhow::Error),

    /// The attempt counter backend returned an error.
    #[error("failed login counter failed: {0}")]
    AttemptCounter(#[source] anyhow::Error),

    /// Hashing or key derivation failed.
    #[error(transparent)]
    Crypto(#[from] AuthCryptoError),

    /// A token could not be generated or parsed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Result of pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Reason a guard refused an otherwise resolved record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardVeto {
    /// The record's `active` state is off.
    #[error("your account is not active")]
    Inactive,

    /// The record awaits approval.
    #[error("your account is not approved")]
    NotApproved,

    /// The record awaits confirmation.
    #[error("your account is not confirmed")]
    NotConfirmed,

    /// The login is inside a brute-force ban window.
    #[error("consecutive failed logins limit exceeded")]
    LockedOut,

    /// Refusal from a host-registered guard, with its message.
    #[error("{0}")]
    Custom(String),
}

/// Recoverable authentication outcomes collected on the session.
///
/// `LockedOut` deliberately carries no attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Password credentials arrived without a login.
    #[error("login can not be blank")]
    LoginBlank,

    /// Password credentials arrived without a password.
    #[error("password can not be blank")]
    PasswordBlank,

    /// No record has the login. Only reported when credential errors are
    /// not generalized.
    #[error("login is not valid")]
    LoginNotFound,

    /// Wrong password, or an unknown login under generalized errors.
    #[error("login or password is not valid")]
    InvalidCredentials,

    /// Too many consecutive failures for the login.
    #[error(
        "consecutive failed logins limit exceeded, account is temporarily locked"
    )]
    LockedOut,

    /// A persisted token lapsed and was discarded.
    #[error("your session has expired")]
    TokenExpired,

    /// A guard refused the resolved record.
    #[error("{0}")]
    GuardVetoed(GuardVeto),

    /// No transport or credential produced a record.
    #[error("you are not signed in")]
    NotAuthenticated,
}

impl AuthFailure {
    /// Whether the failure should be surfaced to the end user. Expired
    /// sessions read as "signed out", not as an error.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, AuthFailure::TokenExpired)
    }
}

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Lapsed token detection.
    Timeout,
    /// Restoring from a transport.
    Transport(TransportKind),
    /// Explicit password credentials.
    Password,
    /// The post-resolution record check.
    Existence,
    /// A named guard.
    Guard(String),
    /// Writing the persistence token.
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Timeout => f.write_str("timeout"),
            Stage::Transport(kind) => write!(f, "transport:{kind}"),
            Stage::Password => f.write_str("password"),
            Stage::Existence => f.write_str("existence"),
            Stage::Guard(name) => write!(f, "guard:{name}"),
            Stage::Persistence => f.write_str("persistence"),
        }
    }
}

/// An [`AuthFailure`] tagged with the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    /// Where the failure was raised.
    pub stage: Stage,
    /// What went wrong.
    pub failure: AuthFailure,
}

impl StageError {
    /// Pair a failure with its stage.
    pub fn new(stage: Stage, failure: AuthFailure) -> Self {
        Self { stage, failure }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_name_their_stage() {
        let error = StageError::new(
            Stage::Transport(TransportKind::Cookie),
            AuthFailure::InvalidCredentials,
        );
        assert_eq!(
            error.to_string(),
            format!(
                "transport:{}: login or password is not valid",
                TransportKind::Cookie
            )
        );
        assert_eq!(
            StageError::new(
                Stage::Guard("magic_states".into()),
                AuthFailure::GuardVetoed(GuardVeto::NotApproved),
            )
            .to_string(),
            "guard:magic_states: your account is not approved"
        );
        assert!(!AuthFailure::TokenExpired.is_user_facing());
        assert!(AuthFailure::LockedOut.is_user_facing());
    }
}
