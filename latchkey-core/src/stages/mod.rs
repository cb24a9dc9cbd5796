//! Pipeline stages.
//!
//! Construction runs one fixed list of stages over a shared
//! [`StageContext`]. Each stage either lets the pipeline continue or halts
//! it; recoverable failures are recorded on the session, infrastructure
//! failures abort with a [`PipelineError`](crate::PipelineError).

mod activity;
mod credentials;
mod existence;
mod guards;
mod persistence;
mod timeout;
mod transports;

pub use guards::{
    BruteForceGuard, FnGuard, Guard, GuardContext, MagicStateGuard, guard_fn,
};

use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::{AuthFailure, PipelineResult, Stage as StageName, StageError};
use crate::events::SessionEvent;
use crate::identity::Identity;
use crate::pipeline::PipelineInner;
use crate::request::HostRequest;
use crate::scope::{ScopeConfig, TransportKeys};
use crate::session::Session;
use crate::transport::{TransportContext, transport_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Halt,
}

/// State shared by the stages of one construction.
pub(crate) struct StageContext<'a, R> {
    pub(crate) session: &'a mut Session<R>,
    pub(crate) request: &'a mut HostRequest,
    pub(crate) config: &'a ScopeConfig,
    pub(crate) keys: &'a TransportKeys,
    pub(crate) inner: &'a PipelineInner<R>,
    pub(crate) now: DateTime<Utc>,
}

impl<'a, R: Identity> StageContext<'a, R> {
    pub(crate) fn transport_context(&self) -> TransportContext<'a> {
        let inner = self.inner;
        TransportContext {
            config: self.config,
            keys: self.keys,
            crypto: inner.ledger.crypto(),
            now: self.now,
        }
    }

    /// Clear every enabled transport that carries sessions across requests.
    pub(crate) fn invalidate_persisting(&mut self) {
        let ctx = self.transport_context();
        for kind in &self.config.transports {
            let transport = transport_for(*kind);
            if transport.persists() {
                transport.invalidate(&ctx, self.request);
            }
        }
    }

    pub(crate) fn fail(&mut self, stage: StageName, failure: AuthFailure) {
        self.session.push_error(StageError::new(stage, failure));
    }

    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.session.events.push(event);
    }

    pub(crate) fn scope(&self) -> String {
        self.config.name.clone()
    }
}

/// One step of session construction.
pub(crate) trait Stage<R>: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow>;
}

/// The construction order. Changing it changes behaviour.
pub(crate) fn default_stages<R: Identity>() -> Vec<Box<dyn Stage<R>>> {
    vec![
        Box::new(timeout::TimeoutStage),
        Box::new(transports::TransportStage),
        Box::new(credentials::CredentialStage),
        Box::new(existence::ExistenceStage),
        Box::new(guards::GuardStage),
        Box::new(persistence::PersistenceStage),
        Box::new(activity::ActivityStage),
    ]
}
