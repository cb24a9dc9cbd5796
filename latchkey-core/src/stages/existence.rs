use super::{Flow, Stage, StageContext};
use crate::error::{AuthFailure, PipelineResult, Stage as StageName};
use crate::identity::Identity;

/// Stops the pipeline when nothing resolved a record. A generic error is
/// added only when no earlier stage explained why.
#[derive(Debug)]
pub(crate) struct ExistenceStage;

impl<R: Identity> Stage<R> for ExistenceStage {
    fn name(&self) -> &'static str {
        "existence"
    }

    fn run(&self, cx: &mut StageContext<'_, R>) -> PipelineResult<Flow> {
        if cx.session.record.is_some() {
            return Ok(Flow::Continue);
        }
        if cx.session.errors.is_empty() {
            cx.fail(StageName::Existence, AuthFailure::NotAuthenticated);
        }
        Ok(Flow::Halt)
    }
}
