use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use beamline::api::{run_experiment, ExperimentConfig};
use beamline::design::DesignRequest;
use beamline::llm::ScriptedModel;
use beamline::toolbox::{DesignStore, MemoryStore};
use clap::{Parser, Subcommand};
use sandbox::{Sandbox, SandboxConfig};
use tracing_subscriber::fmt::SubscriberBuilder;

mod provenance;

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "Optics-table design and simulation runner")]
struct Cmd {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Run the design loop, optionally the simulation loop, write a report
    Run {
        /// Natural-language experiment request
        #[arg(long)]
        prompt: String,
        /// File of recorded model responses (JSON array of strings),
        /// replayed in order instead of calling a live model
        #[arg(long)]
        replay: String,
        #[arg(long)]
        out: String,
        /// Stop after the design loop
        #[arg(long, default_value_t = false)]
        design_only: bool,
        #[arg(long, default_value_t = 3)]
        cycles: u32,
        #[arg(long, default_value_t = 3)]
        iterations: u32,
        /// Sandbox wall-clock timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        /// Interpreter for generated simulation code
        #[arg(long, default_value = "python3")]
        interpreter: String,
        /// JSON file of stored designs ({"id": <design>, ...}) for the
        /// reuse branch
        #[arg(long)]
        toolbox: Option<String>,
    },
    /// List the designs a toolbox file offers for reuse
    Toolbox {
        #[arg(long)]
        file: String,
    },
}

fn main() -> Result<()> {
    SubscriberBuilder::default().with_target(false).init();
    let cmd = Cmd::parse();
    match cmd.action {
        Action::Run {
            prompt,
            replay,
            out,
            design_only,
            cycles,
            iterations,
            timeout_secs,
            interpreter,
            toolbox,
        } => run(RunArgs {
            prompt,
            replay,
            out,
            design_only,
            cycles,
            iterations,
            timeout_secs,
            interpreter,
            toolbox,
        }),
        Action::Toolbox { file } => list_toolbox(file),
    }
}

struct RunArgs {
    prompt: String,
    replay: String,
    out: String,
    design_only: bool,
    cycles: u32,
    iterations: u32,
    timeout_secs: u64,
    interpreter: String,
    toolbox: Option<String>,
}

fn run(args: RunArgs) -> Result<()> {
    let mut model = load_replay(&args.replay)?;
    let store = match &args.toolbox {
        Some(path) => load_toolbox(path)?,
        None => MemoryStore::new(),
    };
    let sandbox = Sandbox::new(SandboxConfig {
        interpreter: args.interpreter,
        timeout: Duration::from_secs(args.timeout_secs),
        ..SandboxConfig::default()
    });
    let config = ExperimentConfig {
        design: beamline::api::DesignLoopConfigSerde {
            max_cycles: args.cycles,
        },
        simulation: beamline::api::SimulationLoopConfigSerde {
            max_iterations: args.iterations,
        },
        design_only: args.design_only,
    };

    tracing::info!(
        prompt = args.prompt,
        design_only = args.design_only,
        cycles = args.cycles,
        iterations = args.iterations,
        "run"
    );
    let request = DesignRequest::new(&args.prompt);
    let report = run_experiment(&mut model, &sandbox, &store, &request, &config)
        .map_err(|err| anyhow::anyhow!("model transport failure: {err}"))?;

    let out_path = Path::new(&args.out);
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out_path, serde_json::to_vec_pretty(&report)?)
        .with_context(|| format!("writing {}", args.out))?;

    let summary = serde_json::json!({
        "prompt": args.prompt,
        "design_status": report.design.status,
        "design_title": report.design.design.title,
        "cycles_used": report.design.cycles_used,
        "simulation": report.simulation.as_ref().map(|sim| serde_json::json!({
            "valid": sim.valid,
            "converged": sim.converged,
            "confidence": sim.confidence,
            "physics_limited": sim.physics_limited,
            "iterations_used": sim.iterations_used,
            "figures": sim.attempt.execution.as_ref().map(|e| e.figures.len()).unwrap_or(0),
        })),
    });
    provenance::write_sidecar(out_path, provenance::Payload::new(summary.clone()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn list_toolbox(file: String) -> Result<()> {
    let store = load_toolbox(&file)?;
    for summary in store.list() {
        println!("{}\t{}", summary.id, summary.title);
    }
    Ok(())
}

fn load_replay(path: &str) -> Result<ScriptedModel> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let responses: Vec<String> =
        serde_json::from_str(&text).with_context(|| format!("parsing {path} as a JSON array"))?;
    Ok(ScriptedModel::new(responses))
}

fn load_toolbox(path: &str) -> Result<MemoryStore> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let designs: std::collections::BTreeMap<String, beamline::design::Design> =
        serde_json::from_str(&text).with_context(|| format!("parsing {path} as a toolbox"))?;
    let mut store = MemoryStore::new();
    for (id, design) in designs {
        store.insert(id, design);
    }
    Ok(store)
}
