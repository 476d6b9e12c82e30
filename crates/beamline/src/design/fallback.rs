//! Canned minimal layouts used when generation fails twice in a row.
//!
//! Keyed by simple keyword match on the request text. These are deliberately
//! small: a rendering-safe skeleton the user can iterate on beats an error.

use std::collections::BTreeMap;

use super::{BeamPath, Component, ComponentKind, Design};

/// Pick a canned design for `query`. Always returns something.
pub fn fallback_for(query: &str) -> Design {
    let lower = query.to_ascii_lowercase();
    if lower.contains("bell") || lower.contains("entangle") {
        bell_pair()
    } else if lower.contains("hong-ou-mandel") || lower.contains("hong ou mandel") || lower.contains("hom")
    {
        hong_ou_mandel()
    } else if lower.contains("mach-zehnder") || lower.contains("mach zehnder") || lower.contains("interferometer")
    {
        mach_zehnder()
    } else {
        minimal_beam()
    }
}

fn component(kind: ComponentKind, name: &str, x: f64, y: f64, angle: f64) -> Component {
    Component {
        kind,
        name: name.to_string(),
        x,
        y,
        angle,
        parameters: BTreeMap::new(),
    }
}

/// SPDC source feeding two detectors: the canned layout for anything that
/// smells of entanglement or Bell tests.
pub fn bell_pair() -> Design {
    Design {
        title: "Bell pair generation (fallback layout)".to_string(),
        description: "SPDC source with signal and idler arms ending in two detectors.".to_string(),
        components: vec![
            component(ComponentKind::Laser, "pump_laser", 0.0, 2.0, 0.0),
            component(ComponentKind::SpdcSource, "spdc_crystal", 2.0, 2.0, 0.0),
            component(ComponentKind::Detector, "detector_signal", 5.0, 3.0, 180.0),
            component(ComponentKind::Detector, "detector_idler", 5.0, 1.0, 180.0),
            component(
                ComponentKind::CoincidenceCounter,
                "coincidence_counter",
                6.0,
                2.0,
                0.0,
            ),
        ],
        beam_path: vec![
            BeamPath::new(vec![(0.0, 2.0), (2.0, 2.0), (5.0, 3.0), (6.0, 2.0)]),
            BeamPath::new(vec![(2.0, 2.0), (5.0, 1.0), (6.0, 2.0)]),
        ],
        physics_explanation: "Parametric down-conversion emits photon pairs into two arms; \
                              coincidence counting witnesses the correlations."
            .to_string(),
        expected_outcome: "Correlated detection events between the two arms.".to_string(),
        component_justifications: BTreeMap::new(),
    }
}

/// Two single photons meeting on a 50:50 beam splitter.
pub fn hong_ou_mandel() -> Design {
    Design {
        title: "Hong-Ou-Mandel interference (fallback layout)".to_string(),
        description: "Two indistinguishable photons interfering on a balanced beam splitter."
            .to_string(),
        components: vec![
            component(ComponentKind::SpdcSource, "photon_pair_source", 0.0, 2.0, 0.0),
            component(ComponentKind::Mirror, "mirror_upper", 2.0, 4.0, 45.0),
            component(ComponentKind::Mirror, "mirror_lower", 2.0, 0.0, -45.0),
            component(ComponentKind::BeamSplitter, "bs_5050", 4.0, 2.0, 45.0),
            component(ComponentKind::Detector, "detector_a", 6.0, 3.0, 180.0),
            component(ComponentKind::Detector, "detector_b", 6.0, 1.0, 180.0),
        ],
        beam_path: vec![
            BeamPath::new(vec![(0.0, 2.0), (2.0, 4.0), (4.0, 2.0), (6.0, 3.0)]),
            BeamPath::new(vec![(0.0, 2.0), (2.0, 0.0), (4.0, 2.0), (6.0, 1.0)]),
        ],
        physics_explanation: "Indistinguishable photons bunch at the beam splitter; the \
                              coincidence rate dips as path delay goes to zero."
            .to_string(),
        expected_outcome: "Coincidence dip at zero delay.".to_string(),
        component_justifications: BTreeMap::new(),
    }
}

pub fn mach_zehnder() -> Design {
    Design {
        title: "Mach-Zehnder interferometer (fallback layout)".to_string(),
        description: "Single input split into two arms with a phase shifter, recombined."
            .to_string(),
        components: vec![
            component(ComponentKind::Laser, "input_laser", 0.0, 0.0, 0.0),
            component(ComponentKind::BeamSplitter, "bs_in", 2.0, 0.0, 45.0),
            component(ComponentKind::Mirror, "mirror_upper", 2.0, 2.0, 45.0),
            component(ComponentKind::Mirror, "mirror_lower", 4.0, 0.0, 45.0),
            component(ComponentKind::PhaseShifter, "phase_arm", 3.0, 2.0, 0.0),
            component(ComponentKind::BeamSplitter, "bs_out", 4.0, 2.0, 45.0),
            component(ComponentKind::Detector, "detector_bright", 6.0, 2.0, 180.0),
            component(ComponentKind::Detector, "detector_dark", 4.0, 4.0, -90.0),
        ],
        beam_path: vec![
            BeamPath::new(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (3.0, 2.0), (4.0, 2.0), (6.0, 2.0)]),
            BeamPath::new(vec![(2.0, 0.0), (4.0, 0.0), (4.0, 2.0), (4.0, 4.0)]),
        ],
        physics_explanation: "Relative phase between the arms steers light between the two \
                              output ports."
            .to_string(),
        expected_outcome: "Complementary interference fringes at the two detectors.".to_string(),
        component_justifications: BTreeMap::new(),
    }
}

pub fn minimal_beam() -> Design {
    Design {
        title: "Single beam line (fallback layout)".to_string(),
        description: "Source aimed at a detector; a starting point to refine.".to_string(),
        components: vec![
            component(ComponentKind::Laser, "laser", 0.0, 0.0, 0.0),
            component(ComponentKind::Detector, "detector", 4.0, 0.0, 180.0),
        ],
        beam_path: vec![BeamPath::new(vec![(0.0, 0.0), (4.0, 0.0)])],
        physics_explanation: "Direct illumination of a single detector.".to_string(),
        expected_outcome: "Constant count rate at the detector.".to_string(),
        component_justifications: BTreeMap::new(),
    }
}
