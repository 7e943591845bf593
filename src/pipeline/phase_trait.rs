use super::context::BuildContext;
use super::error::BuildError;
use super::state::JobState;
use crate::job::BuildPhase;
use async_trait::async_trait;

#[async_trait]
pub trait WorkflowPhase: Send + Sync {
    fn phase(&self) -> BuildPhase;

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError>;
}
