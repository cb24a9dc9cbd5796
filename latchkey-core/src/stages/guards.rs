use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::{Flow, Stage, StageContext};
use crate::brute_force::attempt_key;
use crate::error::{
    AuthFailure, GuardVeto, PipelineError, PipelineResult, Stage as StageName,
};
use crate::events::SessionEvent;
use crate::identity::{Identity, MagicState};
use crate::scope::ScopeConfig;

/// What a guard may look at besides the record.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub scope: &'a str,
    pub config: &'a ScopeConfig,
    pub now: DateTime<Utc>,
    /// Consecutive failed logins currently counted for the record's login.
    pub failed_logins: u32,
}

/// A predicate that may veto an otherwise resolved record.
///
/// Guards must not mutate the record. The first veto stops the chain.
pub trait Guard<R>: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, record: &R, cx: &GuardContext<'_>) -> Result<(), GuardVeto>;
}

/// Refuses records whose magic state column is explicitly false. Records
/// without the column pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicStateGuard {
    state: MagicState,
}

impl MagicStateGuard {
    pub fn new(state: MagicState) -> Self {
        Self { state }
    }
}

impl<R: Identity> Guard<R> for MagicStateGuard {
    fn name(&self) -> &str {
        self.state.as_str()
    }

    fn check(&self, record: &R, _cx: &GuardContext<'_>) -> Result<(), GuardVeto> {
        match record.magic_state(self.state) {
            Some(false) => Err(match self.state {
                MagicState::Active => GuardVeto::Inactive,
                MagicState::Approved => GuardVeto::NotApproved,
                MagicState::Confirmed => GuardVeto::NotConfirmed,
            }),
            _ => Ok(()),
        }
    }
}

/// Refuses records whose login is locked out, however the record was found.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceGuard;

impl<R: Identity> Guard<R> for BruteForceGuard {
    fn name(&self) -> &str {
        "brute_force"
    }

    fn check(&self, _record: &R, cx: &GuardContext<'_>) -> Result<(), GuardVeto> {
        if cx.config.brute_force.is_exceeded(cx.failed_logins) {
            return Err(GuardVeto::LockedOut);
        }
        Ok(())
    }
}

/// Guard backed by a closure.
pub struct FnGuard<F> {
    name: String,
    check: F,
}

impl<F> fmt::Debug for FnGuard<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGuard").field("name", &self.name).finish()
    }
}

/// Build a [`Guard`] from a closure.
pub fn guard_fn<R, F>(name: impl Into<String>, check: F) -> FnGuard<F>
where
    F: Fn(&R, &GuardContext<'_>) -> Result<(), GuardVeto> + Send + Sync,
{
    FnGuard {
        name: name.into(),
        check,
    }
}

impl<R, F> Guard<R> for FnGuard<F>
where
    F: Fn(&R, &GuardContext<'_>) -> Result<(), GuardVeto> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, record: &R, cx: &GuardContext<'_>) -> Result<(), GuardVeto> {
        (self.check)(record, cx)
    }
}

/// Runs magic state guards, then brute force protection, then the scope's
/// custom guards.
#[derive(Debug)]
pub(crate) struct GuardStage;

impl GuardStage {
    fn first_veto<R: Identity>(
        record: &R,
        gcx: &GuardContext<'_>,
        custom: &[Arc<dyn Guard<R>>],
    ) -> Option<(String, GuardVeto)> {
        let magic: Vec<MagicStateGuard> = gcx
            .config
            .magic_states
            .iter()
            .copied()
            .map(MagicStateGuard::new)
            .collect();
        let brute_force = BruteForceGuard;

        magic
            .iter()
            .map(|guard| guard as &dyn Guard<R>)
            .chain(std::iter::once(&brute_force as &dyn Guard<R>))
            .chain(custom.iter().map(|guard| guard.as_ref()))
            .find_map(|guard| {
                guard
                    .check(record, gcx)
                    .err()
                    .map(|veto| (guard.name().to_string(), veto))
            })
    }
}

impl<R: Identity> Stage<R> for GuardStage {
    fn name(&self) -> &'static str {
        "guards"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        let config = cx.config;
        let Some(record) = cx.session.record.as_ref() else {
            return Ok(Flow::Continue);
        };

        let failed_logins = if config.brute_force.is_enabled() {
            cx.inner
                .attempts
                .failures(
                    &attempt_key(&config.name, record.login()),
                    config.brute_force.ban_for,
                    cx.now,
                )
                .map_err(PipelineError::AttemptCounter)?
        } else {
            0
        };
        let gcx = GuardContext {
            scope: &config.name,
            config,
            now: cx.now,
            failed_logins,
        };

        let Some((guard, veto)) =
            Self::first_veto(record, &gcx, cx.inner.guards_for(&config.name))
        else {
            return Ok(Flow::Continue);
        };

        let record_id = record.id();
        info!(
            scope = %config.name,
            record_id = %record_id,
            guard = %guard,
            reason = %veto,
            "guard vetoed session"
        );

        cx.session.record = None;
        cx.session.resolution = None;
        cx.session.persistence_digest = None;
        if let Some(token) = cx.session.persistence_token.take() {
            cx.inner.ledger.revoke(&token)?;
            cx.invalidate_persisting();
        }

        let failure = match &veto {
            GuardVeto::LockedOut => AuthFailure::LockedOut,
            other => AuthFailure::GuardVetoed(other.clone()),
        };
        cx.emit(SessionEvent::Vetoed {
            scope: cx.scope(),
            record_id,
            guard: guard.clone(),
            reason: veto.to_string(),
            timestamp: cx.now,
        });
        cx.fail(StageName::Guard(guard), failure);
        Ok(Flow::Halt)
    }
}
