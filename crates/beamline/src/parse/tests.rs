use super::*;
use crate::llm::ScriptedModel;
use proptest::prelude::*;
use serde_json::json;

#[test]
fn extracts_object_from_prose_and_fences() {
    let raw = "Sure! Here is the design:\n```json\n{\"title\": \"HOM\", \"n\": 2}\n```\nLet me know.";
    let value = extract_json(raw).unwrap();
    assert_eq!(value["title"], "HOM");
    assert_eq!(value["n"], 2);
}

#[test]
fn nested_braces_inside_strings_do_not_confuse_the_scanner() {
    let raw = r#"{"note": "a { weird } string with \" escapes", "k": [1, 2]}"#;
    let value = extract_json(raw).unwrap();
    assert_eq!(value["k"][1], 2);
}

#[test]
fn missing_and_unbalanced_objects_are_distinct_errors() {
    assert_eq!(extract_json("no json here"), Err(ParseError::NoObject));
    assert_eq!(
        extract_json(r#"{"title": "cut off mid"#),
        Err(ParseError::Unbalanced)
    );
}

#[test]
fn close_truncated_recovers_a_cut_response() {
    let raw = r#"{"title": "Bell", "components": [{"type": "laser"}, {"type": "det"#;
    let repaired = close_truncated(raw).unwrap();
    let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
    assert_eq!(value["title"], "Bell");
    assert_eq!(value["components"][0]["type"], "laser");
}

#[test]
fn close_truncated_drops_dangling_key_without_value() {
    let raw = r#"{"title": "Bell", "description":"#;
    let repaired = close_truncated(raw).unwrap();
    let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
    assert_eq!(value["title"], "Bell");
    assert!(value.get("description").is_none());
}

#[test]
fn request_json_makes_one_call_on_clean_output() {
    let mut model = ScriptedModel::new([r#"{"ok": true}"#]);
    let (value, origin) = request_json(&mut model, "prompt").unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(origin, ParseOrigin::Clean);
    assert_eq!(model.prompts().len(), 1);
}

#[test]
fn request_json_issues_exactly_one_repair_reprompt() {
    let mut model = ScriptedModel::new([r#"{"broken": "#, r#"{"fixed": 1}"#]);
    let (value, origin) = request_json(&mut model, "prompt").unwrap();
    assert_eq!(value["fixed"], 1);
    assert_eq!(origin, ParseOrigin::Reprompted);
    assert_eq!(model.prompts().len(), 2);
    assert!(model.prompts()[1].contains("Close every brace"));
    assert!(model.prompts()[1].contains(r#"{"broken": "#));
}

#[test]
fn request_json_falls_back_to_truncation_repair() {
    let truncated = r#"{"title": "Bell", "issues": ["needs second det"#;
    let mut model = ScriptedModel::new([truncated, "still not json at all, sorry {"]);
    let (value, origin) = request_json(&mut model, "prompt").unwrap();
    assert_eq!(origin, ParseOrigin::Truncated);
    assert_eq!(value["title"], "Bell");
}

#[test]
fn request_json_gives_up_after_both_paths_fail() {
    let mut model = ScriptedModel::new(["nothing", "still nothing"]);
    let err = request_json(&mut model, "prompt").unwrap_err();
    assert!(matches!(err, RequestError::Malformed(_)));
    assert_eq!(model.prompts().len(), 2);
}

#[test]
fn transport_error_propagates_unclassified_by_parse_layer() {
    let mut model = ScriptedModel::default();
    model.push_error(crate::llm::LlmError::RateLimited("429".into()));
    let err = request_json(&mut model, "prompt").unwrap_err();
    assert!(matches!(err, RequestError::Llm(_)));
}

proptest! {
    /// Any serializable object survives the extraction path untouched:
    /// well-formed output never needs repair.
    #[test]
    fn well_formed_objects_extract_cleanly(title in "[a-zA-Z0-9 {}\\\\\"]{0,40}", score in 0u8..=10) {
        let value = json!({"title": title, "score": score});
        let raw = format!("preamble\n{value}\ntrailer");
        let extracted = extract_json(&raw).unwrap();
        prop_assert_eq!(extracted, value);
    }

    /// Truncation repair of an arbitrary prefix either declines or yields
    /// valid JSON; it never panics.
    #[test]
    fn close_truncated_output_is_valid_json_or_none(cut in 1usize..80) {
        let full = r#"{"title": "Bell pair", "components": [{"type": "laser", "x": 1.5}], "ok": true}"#;
        let cut = cut.min(full.len());
        if !full.is_char_boundary(cut) {
            return Ok(());
        }
        if let Some(repaired) = close_truncated(&full[..cut]) {
            prop_assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok(),
                "repair produced invalid JSON: {}", repaired);
        }
    }
}
