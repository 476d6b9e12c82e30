use super::*;
use serde_json::json;

fn detector_at(x: f64, y: f64) -> Component {
    Component {
        kind: ComponentKind::Detector,
        name: format!("det_{x}_{y}"),
        x,
        y,
        angle: 0.0,
        parameters: BTreeMap::new(),
    }
}

#[test]
fn component_kind_tags_round_trip_including_custom() {
    for tag in ["laser", "beam_splitter", "coincidence_counter", "custom_cavity"] {
        assert_eq!(ComponentKind::from_tag(tag).as_tag(), tag);
    }
    assert!(matches!(
        ComponentKind::from_tag("custom_cavity"),
        ComponentKind::Custom(_)
    ));
}

#[test]
fn design_deserializes_from_model_style_json() {
    let raw = json!({
        "title": "HOM dip",
        "description": "two-photon interference",
        "components": [
            {"type": "spdc_source", "name": "source", "x": 0.0, "y": 2.0},
            {"type": "beam_splitter", "name": "bs", "x": 4.0, "y": 2.0, "angle": 45.0,
             "parameters": {"transmittance": 0.5}},
            {"type": "detector", "name": "d1", "x": 6.0, "y": 3.0},
            {"type": "detector", "name": "d2", "x": 6.0, "y": 1.0}
        ],
        "beam_path": [
            [[0.0, 2.0], [4.0, 2.0], [6.0, 3.0]],
            [[0.0, 2.0], [4.0, 2.0], [6.0, 1.0]]
        ],
        "physics_explanation": "bunching",
        "expected_outcome": "coincidence dip"
    });
    let design: Design = serde_json::from_value(raw).unwrap();
    assert!(design.is_structurally_valid());
    assert_eq!(design.components.len(), 4);
    assert_eq!(design.beam_path[1].waypoints.len(), 3);
    assert_eq!(design.detector_count(), 2);
    assert!(design.has_source());
    assert_eq!(
        design.components[1].parameters["transmittance"],
        json!(0.5)
    );
}

#[test]
fn connectivity_flags_only_stranded_components() {
    let mut design = fallback::bell_pair();
    assert!(design.connectivity_violations(CONNECT_TOL).is_empty());

    design.components.push(detector_at(40.0, 40.0));
    let violations = design.connectivity_violations(CONNECT_TOL);
    assert_eq!(violations, vec!["det_40_40".to_string()]);
}

#[test]
fn connectivity_tolerance_is_inclusive() {
    let design = Design {
        title: "t".into(),
        description: String::new(),
        components: vec![detector_at(0.0, CONNECT_TOL)],
        beam_path: vec![BeamPath::new(vec![(0.0, 0.0)])],
        physics_explanation: String::new(),
        expected_outcome: String::new(),
        component_justifications: BTreeMap::new(),
    };
    assert!(design.connectivity_violations(CONNECT_TOL).is_empty());
}

#[test]
fn empty_title_or_components_is_structurally_invalid() {
    let mut design = fallback::minimal_beam();
    design.title.clear();
    assert!(!design.is_structurally_valid());

    let mut design = fallback::minimal_beam();
    design.components.clear();
    assert!(!design.is_structurally_valid());
}

#[test]
fn fallback_keyword_match_routes_to_the_right_layout() {
    assert!(fallback::fallback_for("please entangle two photons")
        .title
        .contains("Bell"));
    assert!(fallback::fallback_for("a Hong-Ou-Mandel dip measurement")
        .title
        .contains("Hong-Ou-Mandel"));
    assert!(fallback::fallback_for("a mach-zehnder with one phase arm")
        .title
        .contains("Mach-Zehnder"));
    assert!(fallback::fallback_for("something else entirely")
        .title
        .contains("Single beam"));
}

#[test]
fn all_fallback_layouts_pass_their_own_connectivity_check() {
    for design in [
        fallback::bell_pair(),
        fallback::hong_ou_mandel(),
        fallback::mach_zehnder(),
        fallback::minimal_beam(),
    ] {
        assert!(design.is_structurally_valid(), "{}", design.title);
        assert!(
            design.connectivity_violations(CONNECT_TOL).is_empty(),
            "stranded components in {}",
            design.title
        );
        assert!(design.has_source(), "{}", design.title);
        assert!(design.detector_count() >= 1, "{}", design.title);
    }
}
