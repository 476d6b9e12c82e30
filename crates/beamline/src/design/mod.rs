//! Optical-table design artifacts.
//!
//! - `Design`: the structured proposal (components, beam paths, narrative
//!   fields) produced by the design loop.
//! - `Component` / `ComponentKind`: table elements with positions, angles,
//!   and per-kind parameter maps.
//! - `BeamPath`: an ordered polyline of table-coordinate waypoints; several
//!   polylines represent distinguishable photon routes.
//!
//! Connectivity (every component near some beam-path waypoint) is a soft
//! invariant checked by the validator, not enforced by construction;
//! `Design::connectivity_violations` exposes the same check to callers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod fallback;

/// Distance (table units) within which a component counts as "on" a beam
/// path.
pub const CONNECT_TOL: f64 = 0.5;

/// Controlled vocabulary of table elements, with an escape hatch for
/// `custom_*` tags the model invents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentKind {
    Laser,
    SpdcSource,
    SinglePhotonSource,
    BeamSplitter,
    PolarizingBeamSplitter,
    Mirror,
    PhaseShifter,
    HalfWavePlate,
    QuarterWavePlate,
    Polarizer,
    Lens,
    Fiber,
    Attenuator,
    Detector,
    CoincidenceCounter,
    Screen,
    Custom(String),
}

impl ComponentKind {
    pub fn as_tag(&self) -> &str {
        match self {
            ComponentKind::Laser => "laser",
            ComponentKind::SpdcSource => "spdc_source",
            ComponentKind::SinglePhotonSource => "single_photon_source",
            ComponentKind::BeamSplitter => "beam_splitter",
            ComponentKind::PolarizingBeamSplitter => "polarizing_beam_splitter",
            ComponentKind::Mirror => "mirror",
            ComponentKind::PhaseShifter => "phase_shifter",
            ComponentKind::HalfWavePlate => "half_wave_plate",
            ComponentKind::QuarterWavePlate => "quarter_wave_plate",
            ComponentKind::Polarizer => "polarizer",
            ComponentKind::Lens => "lens",
            ComponentKind::Fiber => "fiber",
            ComponentKind::Attenuator => "attenuator",
            ComponentKind::Detector => "detector",
            ComponentKind::CoincidenceCounter => "coincidence_counter",
            ComponentKind::Screen => "screen",
            ComponentKind::Custom(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "laser" => ComponentKind::Laser,
            "spdc_source" => ComponentKind::SpdcSource,
            "single_photon_source" => ComponentKind::SinglePhotonSource,
            "beam_splitter" => ComponentKind::BeamSplitter,
            "polarizing_beam_splitter" => ComponentKind::PolarizingBeamSplitter,
            "mirror" => ComponentKind::Mirror,
            "phase_shifter" => ComponentKind::PhaseShifter,
            "half_wave_plate" => ComponentKind::HalfWavePlate,
            "quarter_wave_plate" => ComponentKind::QuarterWavePlate,
            "polarizer" => ComponentKind::Polarizer,
            "lens" => ComponentKind::Lens,
            "fiber" => ComponentKind::Fiber,
            "attenuator" => ComponentKind::Attenuator,
            "detector" => ComponentKind::Detector,
            "coincidence_counter" => ComponentKind::CoincidenceCounter,
            "screen" => ComponentKind::Screen,
            other => ComponentKind::Custom(other.to_string()),
        }
    }

    /// Light originates here; causality requires sources before the optics
    /// they feed.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            ComponentKind::Laser | ComponentKind::SpdcSource | ComponentKind::SinglePhotonSource
        )
    }

    pub fn is_detector(&self) -> bool {
        matches!(
            self,
            ComponentKind::Detector | ComponentKind::CoincidenceCounter | ComponentKind::Screen
        )
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for ComponentKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for ComponentKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(ComponentKind::from_tag(&tag))
    }
}

/// One element on the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub angle: f64,
    /// Per-kind semantics: wavelength, transmittance, efficiency, ...
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Component {
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// An ordered polyline of `(x, y)` waypoints tracing one light path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeamPath {
    pub waypoints: Vec<(f64, f64)>,
}

impl BeamPath {
    pub fn new(waypoints: Vec<(f64, f64)>) -> Self {
        Self { waypoints }
    }

    /// Squared distance from `(x, y)` to the nearest waypoint.
    fn nearest_waypoint_dist2(&self, x: f64, y: f64) -> f64 {
        self.waypoints
            .iter()
            .map(|(wx, wy)| (wx - x).powi(2) + (wy - y).powi(2))
            .fold(f64::INFINITY, f64::min)
    }
}

/// The structured proposal for an experiment.
///
/// Replaced wholesale on each refinement cycle, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub components: Vec<Component>,
    #[serde(default)]
    pub beam_path: Vec<BeamPath>,
    #[serde(default)]
    pub physics_explanation: String,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub component_justifications: BTreeMap<String, String>,
}

impl Design {
    /// Structural validity: enough to attempt rendering and critique.
    /// Anything beyond this is the validator's business.
    pub fn is_structurally_valid(&self) -> bool {
        !self.title.is_empty() && !self.components.is_empty()
    }

    /// Names of components farther than `tol` from every beam-path waypoint.
    ///
    /// Computed programmatically before any critic call; violations are
    /// folded into the critique prompt as forced issues.
    pub fn connectivity_violations(&self, tol: f64) -> Vec<String> {
        let tol2 = tol * tol;
        self.components
            .iter()
            .filter(|c| {
                !self
                    .beam_path
                    .iter()
                    .any(|path| path.nearest_waypoint_dist2(c.x, c.y) <= tol2)
            })
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_source(&self) -> bool {
        self.components.iter().any(|c| c.kind.is_source())
    }

    pub fn detector_count(&self) -> usize {
        self.components.iter().filter(|c| c.kind.is_detector()).count()
    }
}

/// Who said a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// Immutable input to one design cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRequest {
    pub query: String,
    #[serde(default)]
    pub prior_design: Option<Design>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl DesignRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            prior_design: None,
            history: Vec::new(),
        }
    }

    pub fn with_prior(mut self, design: Design) -> Self {
        self.prior_design = Some(design);
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

#[cfg(test)]
mod tests;
