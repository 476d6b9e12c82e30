//! Curated surface for callers: run the design loop, then optionally the
//! simulation convergence loop on whatever design came out.
//!
//! One request-per-interaction, fully synchronous; the report bundles both
//! outcomes for a renderer or UI to consume.

use sandbox::Sandbox;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::design::DesignRequest;
use crate::design_loop::{DesignController, DesignLoopConfig, DesignOutcome};
use crate::llm::{LanguageModel, LlmError};
use crate::sim_loop::{SimulationController, SimulationLoopConfig, SimulationOutcome};
use crate::toolbox::DesignStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub design: DesignLoopConfigSerde,
    #[serde(default)]
    pub simulation: SimulationLoopConfigSerde,
    /// Skip the simulation loop entirely (design only).
    #[serde(default)]
    pub design_only: bool,
}

// Serde-friendly mirrors of the loop configs, so the CLI can read one JSON
// config block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignLoopConfigSerde {
    pub max_cycles: u32,
}

impl Default for DesignLoopConfigSerde {
    fn default() -> Self {
        Self {
            max_cycles: DesignLoopConfig::default().max_cycles,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationLoopConfigSerde {
    pub max_iterations: u32,
}

impl Default for SimulationLoopConfigSerde {
    fn default() -> Self {
        Self {
            max_iterations: SimulationLoopConfig::default().max_iterations,
        }
    }
}

/// Both loop outcomes for one user interaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub design: DesignOutcome,
    pub simulation: Option<SimulationOutcome>,
}

/// Run one full interaction: design loop, then (unless `design_only` or the
/// design fell back to a canned layout) the simulation loop.
pub fn run_experiment<M: LanguageModel, S: DesignStore>(
    model: &mut M,
    sandbox: &Sandbox,
    store: &S,
    request: &DesignRequest,
    config: &ExperimentConfig,
) -> Result<ExperimentReport, LlmError> {
    let design_controller = DesignController::new(DesignLoopConfig {
        max_cycles: config.design.max_cycles,
    });
    let design = design_controller.run(model, store, request)?;
    info!(status = ?design.status, title = %design.design.title, "design loop finished");

    let simulation = if config.design_only {
        None
    } else {
        let controller = SimulationController::new(SimulationLoopConfig {
            max_iterations: config.simulation.max_iterations,
        });
        Some(controller.run(model, sandbox, &design.design)?)
    };

    Ok(ExperimentReport { design, simulation })
}
