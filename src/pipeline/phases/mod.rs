// Build pipeline phases
//
// Each phase mutates the shared JobState in place. The orchestrator runs them
// strictly in file order and never skips one; phases that do not apply to the
// selected strategy return early.

#[path = "01_init.rs"]
pub mod init;
#[path = "02_scaffold.rs"]
pub mod scaffold;
#[path = "03_dependencies.rs"]
pub mod dependencies;
#[path = "04_implement.rs"]
pub mod implement;
#[path = "05_integrate.rs"]
pub mod integrate;
#[path = "06_finalize.rs"]
pub mod finalize;

pub use dependencies::DependenciesPhase;
pub use finalize::FinalizePhase;
pub use implement::ImplementPhase;
pub use init::InitPhase;
pub use integrate::IntegratePhase;
pub use scaffold::ScaffoldPhase;

use super::phase_trait::WorkflowPhase;

/// The six phases in execution order
pub fn default_phases() -> Vec<Box<dyn WorkflowPhase>> {
    vec![
        Box::new(InitPhase),
        Box::new(ScaffoldPhase),
        Box::new(DependenciesPhase),
        Box::new(ImplementPhase),
        Box::new(IntegratePhase),
        Box::new(FinalizePhase),
    ]
}
