//! Core orchestration for the LLM-driven optics-table designer.
//!
//! Two sibling control loops share one shape (generate, check, retry with
//! feedback, converge or exhaust):
//! - `design_loop`: natural-language request -> validated `Design`.
//! - `sim_loop`: validated `Design` -> executable simulation code whose
//!   output is judged faithful to the design.
//!
//! All loop state lives in the controllers; generators and critics are
//! stateless prompt builders around a `LanguageModel`. The only component
//! with a hard timeout is the `sandbox` subprocess runner.
//!
//! API Policy
//! - This crate is project-internal. There is no stable public API.
//! - Breaking changes are encouraged when they improve quality.

pub mod api;
pub mod design;
pub mod design_loop;
pub mod llm;
pub mod parse;
pub mod sim_loop;
pub mod toolbox;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::design::{
        BeamPath, Component, ComponentKind, Design, DesignRequest, ChatRole, ChatTurn,
    };
    pub use crate::design_loop::{DesignController, DesignLoopConfig, DesignOutcome, DesignStatus};
    pub use crate::llm::{LanguageModel, LlmError, ScriptedModel};
    pub use crate::sim_loop::{
        Confidence, SimulationController, SimulationLoopConfig, SimulationOutcome,
    };
    pub use crate::toolbox::{DesignStore, DesignSummary, MemoryStore};
    pub use sandbox::{ExecutionResult, Figure, Sandbox, SandboxConfig};
}
