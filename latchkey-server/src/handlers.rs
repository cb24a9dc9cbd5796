use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use latchkey_core::{
    HostRequest, InitArgs, MemoryUser, PipelineResult, Session, SessionPipeline,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::host::HostMedia;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    /// Checkbox semantics: `on`, `true` or `1` ask to be remembered.
    #[serde(default)]
    pub remember_me: Option<String>,
}

impl LoginForm {
    fn remember_me(&self) -> Option<bool> {
        self.remember_me.as_deref().map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "on" | "true" | "1" | "yes"
            )
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionView {
    pub record_id: String,
    pub login: String,
    pub scope: String,
}

impl SessionView {
    fn from_session(session: &Session<MemoryUser>) -> Option<Self> {
        let user = session.record()?;
        Some(Self {
            record_id: user.id.to_string(),
            login: user.login.clone(),
            scope: session.scope().to_string(),
        })
    }
}

/// `POST /{scope}/session`
pub async fn create_session(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    media: HostMedia,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let mut args = InitArgs::password(form.login.clone(), form.password.clone());
    if let Some(remember) = form.remember_me() {
        args = args.remember_me(remember);
    }
    respond(&state, scope, args, media).await
}

/// `GET /{scope}/session`
pub async fn current_session(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    media: HostMedia,
) -> AppResult<Response> {
    respond(&state, scope, InitArgs::none(), media).await
}

/// `DELETE /{scope}/session`
pub async fn destroy_session(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    media: HostMedia,
) -> AppResult<Response> {
    let pipeline = state.pipeline.clone();
    let (outcome, media) = run_blocking(media, move |request| {
        let mut session = pipeline.construct(&scope, InitArgs::none(), request)?;
        session.destroy(request)?;
        log_events(&mut session);
        Ok(())
    })
    .await?;
    outcome?;

    Ok(media.finish(
        StatusCode::NO_CONTENT.into_response(),
        &state.native_sessions,
    ))
}

async fn respond(
    state: &AppState,
    scope: String,
    args: InitArgs<MemoryUser>,
    media: HostMedia,
) -> AppResult<Response> {
    let pipeline: SessionPipeline<MemoryUser> = state.pipeline.clone();
    let (outcome, media) = run_blocking(media, move |request| {
        pipeline.construct(&scope, args, request)
    })
    .await?;
    let mut session = outcome?;
    log_events(&mut session);

    let response = match SessionView::from_session(&session) {
        Some(view) => Json(view).into_response(),
        None => {
            let details = session.error_messages();
            let message = details
                .first()
                .cloned()
                .unwrap_or_else(|| "not authenticated".to_string());
            AppError::unauthorized(message)
                .with_details(details)
                .with_challenge(
                    session.http_auth_challenge().map(str::to_string),
                )
                .into_response()
        }
    };
    Ok(media.finish(response, &state.native_sessions))
}

/// Run one pipeline call on the blocking pool. Argon2 verification and the
/// synchronous stores make construction a single blocking unit.
async fn run_blocking<T, F>(
    mut media: HostMedia,
    work: F,
) -> AppResult<(PipelineResult<T>, HostMedia)>
where
    T: Send + 'static,
    F: FnOnce(&mut HostRequest) -> PipelineResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let outcome = work(&mut media.request);
        (outcome, media)
    })
    .await
    .map_err(|err| AppError::internal(format!("session task failed: {err}")))
}

fn log_events(session: &mut Session<MemoryUser>) {
    for event in session.take_events() {
        match serde_json::to_string(&event) {
            Ok(json) => {
                info!(scope = session.scope(), event = %json, "session event")
            }
            Err(err) => debug!(error = %err, "unserializable session event"),
        }
    }
}
