use tracing::{debug, info};

use super::{Flow, Stage, StageContext};
use crate::brute_force::{attempt_key, is_locked, register_failure};
use crate::error::{
    AuthFailure, PipelineError, PipelineResult, Stage as StageName,
};
use crate::events::SessionEvent;
use crate::identity::{Activity, ActivityKind, Identity};
use crate::session::{Credentials, Resolution};
use crate::transport::PasswordCredentials;

/// Applies explicitly supplied credentials: a login and password, or a
/// record to log in directly.
#[derive(Debug)]
pub(crate) struct CredentialStage;

impl<R: Identity> Stage<R> for CredentialStage {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        let Some(credentials) = cx.session.credentials.take() else {
            return Ok(Flow::Continue);
        };

        match credentials {
            Credentials::Password(credentials) => {
                if let Some(record) =
                    validate_password(cx, &credentials, StageName::Password)?
                {
                    cx.session.record = Some(record);
                    cx.session.resolution = Some(Resolution::Password);
                }
            }
            Credentials::Record(record) => {
                debug!(
                    scope = %cx.config.name,
                    record_id = %record.id(),
                    "authenticating priority record"
                );
                cx.session.record = Some(record);
                cx.session.resolution = Some(Resolution::PriorityRecord);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Check a login and password against the record accessor.
///
/// Locked out logins are refused before the accessor is consulted, so no
/// hashing happens for them. Unknown logins and wrong passwords both count
/// toward the lockout.
pub(crate) fn validate_password<R: Identity>(
    cx: &mut StageContext<'_, R>,
    credentials: &PasswordCredentials,
    stage: StageName,
) -> PipelineResult<Option<R>> {
    let config = cx.config;
    let inner = cx.inner;
    let login = credentials.login.trim();

    let login_blank = login.is_empty();
    let password_blank = credentials.password.is_empty();
    if login_blank {
        cx.fail(stage.clone(), AuthFailure::LoginBlank);
    }
    if password_blank {
        cx.fail(stage.clone(), AuthFailure::PasswordBlank);
    }
    if login_blank || password_blank {
        return Ok(None);
    }

    let key = attempt_key(&config.name, login);
    let counter = inner.attempts.as_ref();
    if is_locked(counter, &config.brute_force, &key, cx.now)
        .map_err(PipelineError::AttemptCounter)?
    {
        info!(scope = %config.name, login, "refusing locked out login");
        reject(cx, login, stage, true);
        return Ok(None);
    }

    let accessor = inner.accessor.as_ref();
    let Some(record) = accessor
        .find_by_login(login)
        .map_err(PipelineError::Accessor)?
    else {
        let locked = register_failure(counter, &config.brute_force, &key, cx.now)
            .map_err(PipelineError::AttemptCounter)?;
        debug!(scope = %config.name, login, "unknown login");
        if locked || config.generalize_credential_errors {
            reject(cx, login, stage, locked);
        } else {
            cx.fail(stage, AuthFailure::LoginNotFound);
            emit_rejected(cx, login);
        }
        return Ok(None);
    };

    if !accessor
        .verify_password(&record, &credentials.password)
        .map_err(PipelineError::Accessor)?
    {
        let locked = register_failure(counter, &config.brute_force, &key, cx.now)
            .map_err(PipelineError::AttemptCounter)?;
        accessor
            .record_activity(
                &record,
                &Activity {
                    kind: ActivityKind::FailedLogin,
                    at: cx.now,
                    remote_ip: cx.request.remote_ip(),
                },
            )
            .map_err(PipelineError::Accessor)?;
        debug!(
            scope = %config.name,
            record_id = %record.id(),
            "password mismatch"
        );
        reject(cx, login, stage, locked);
        return Ok(None);
    }

    if config.brute_force.is_enabled() {
        counter.reset(&key).map_err(PipelineError::AttemptCounter)?;
    }
    Ok(Some(record))
}

fn reject<R: Identity>(
    cx: &mut StageContext<'_, R>,
    login: &str,
    stage: StageName,
    locked: bool,
) {
    if locked {
        cx.fail(stage, AuthFailure::LockedOut);
        cx.emit(SessionEvent::LockedOut {
            scope: cx.scope(),
            login: login.to_string(),
            timestamp: cx.now,
        });
    } else {
        cx.fail(stage, AuthFailure::InvalidCredentials);
        emit_rejected(cx, login);
    }
}

fn emit_rejected<R: Identity>(cx: &mut StageContext<'_, R>, login: &str) {
    cx.emit(SessionEvent::CredentialsRejected {
        scope: cx.scope(),
        login: login.to_string(),
        timestamp: cx.now,
    });
}
