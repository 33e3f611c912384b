//! Provisioning side of stratus: project workspaces on disk, the supervised IaC
//! binary, state file parsing, and the deployer that records each run.

pub mod deployer;
pub mod executor;
pub mod state;
pub mod workspace;

pub use deployer::{DeployError, Deployer};
pub use executor::{
    CommandOutput, ExecutorError, LineStream, TerraformCommand, TerraformExecutor,
    TerraformRunner,
};
pub use state::{StateError, StateReader};
pub use workspace::{WorkspaceError, WorkspaceManager};
