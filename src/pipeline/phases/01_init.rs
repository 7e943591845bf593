use async_trait::async_trait;
use tracing::{debug, info};

use crate::graph::{build_dependency_graph, resolve_build_order, topo::plan_order};
use crate::job::BuildPhase;
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::BuildError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::state::JobState;
use crate::strategy::select_strategy;

/// Builds the dependency graph, picks a strategy and fixes the build order
pub struct InitPhase;

#[async_trait]
impl WorkflowPhase for InitPhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Init
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        let steps = &state.job.plan.steps;
        let graph = build_dependency_graph(steps);
        let strategy = select_strategy(steps, &graph);

        // Sorted for every strategy so a cycle is always reported
        let resolved = resolve_build_order(&graph, steps);
        let order = if strategy.uses_graph_order() {
            resolved.order
        } else {
            plan_order(steps)
        };
        let cycle = resolved.cycle;

        info!(
            job_id = %state.job.id,
            strategy = %strategy,
            nodes = graph.len(),
            edges = graph.edge_count(),
            fallback = cycle.is_some(),
            "Build plan analysed"
        );
        debug!(order = ?order, "Build order");

        state.job.total_steps = state.job.plan.file_step_count();
        state.job.strategy = strategy;
        state.job.dependency_graph = graph;
        state.build_order = order;
        state.cycle = cycle;

        ctx.persist(&mut state.job).await
    }
}
