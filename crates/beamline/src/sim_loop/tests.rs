use super::*;
use crate::design::fallback;
use crate::llm::ScriptedModel;
use sandbox::SandboxConfig;
use std::time::Duration;

fn sh_sandbox() -> Sandbox {
    Sandbox::new(SandboxConfig {
        interpreter: "/bin/sh".to_string(),
        interpreter_args: Vec::new(),
        source_name: "run.sh".to_string(),
        timeout: Duration::from_secs(5),
    })
}

fn controller(max_iterations: u32) -> SimulationController {
    SimulationController::new(SimulationLoopConfig { max_iterations })
}

fn fenced(code: &str) -> String {
    format!("```sh\n{code}\n```")
}

const APPROVE: &str = r#"{"approved": true, "missing_elements": [], "concerns": []}"#;

fn reject(missing: &str) -> String {
    format!(r#"{{"approved": false, "missing_elements": ["{missing}"], "concerns": []}}"#)
}

fn analysis(physics: u8) -> String {
    format!(r#"{{"physics_score": {physics}, "summary": "ok", "recommendations": []}}"#)
}

fn alignment(score: u8, models: bool) -> String {
    format!(
        r#"{{"alignment_score": {score}, "actually_models_design": {models}, "missing_from_code": [], "wrong_in_code": []}}"#
    )
}

#[test]
fn converges_on_first_iteration_with_high_confidence() {
    let mut model = ScriptedModel::new([
        fenced("echo coincidence rate: 0.01"),
        APPROVE.to_string(),
        analysis(8),
        alignment(8, true),
    ]);
    let outcome = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::hong_ou_mandel())
        .unwrap();

    assert!(outcome.valid);
    assert!(outcome.converged);
    assert_eq!(outcome.confidence, Confidence::High);
    assert!(!outcome.physics_limited);
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(outcome.history.len(), 1);
    assert_eq!(outcome.attempt.outcome, AttemptOutcome::Converged);
    assert!(outcome.attempt.execution.as_ref().unwrap().stdout.contains("coincidence"));
}

#[test]
fn faithful_but_weak_physics_is_flagged_not_failed() {
    // Alignment passes, physics rating below the bar: converged with the
    // physics_limited flag, the two axes stay independent.
    let mut model = ScriptedModel::new([
        fenced("echo counts: 3"),
        APPROVE.to_string(),
        analysis(4),
        alignment(7, true),
    ]);
    let outcome = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::bell_pair())
        .unwrap();

    assert!(outcome.converged);
    assert!(outcome.physics_limited);
}

#[test]
fn execution_failures_exhaust_with_valid_false_and_no_best() {
    // Scenario: generated code always crashes. Analyzer is never consulted;
    // every iteration becomes execution-stage feedback.
    let crash = fenced("echo 'ZeroDivisionError: division by zero' >&2; exit 1");
    let mut model = ScriptedModel::new([
        crash.clone(),
        APPROVE.to_string(),
        crash.clone(),
        APPROVE.to_string(),
        crash,
        APPROVE.to_string(),
    ]);
    let outcome = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::bell_pair())
        .unwrap();

    assert!(!outcome.valid);
    assert!(!outcome.converged);
    assert_eq!(outcome.confidence, Confidence::Low);
    assert_eq!(outcome.history.len(), 3);
    assert!(outcome
        .history
        .iter()
        .all(|a| a.outcome == AttemptOutcome::ExecutionFailed));
    // The second generation prompt carries the stderr and the fix-the-bug
    // instruction verbatim.
    let refine_prompt = &model.prompts()[2];
    assert!(refine_prompt.contains("ZeroDivisionError"));
    assert!(refine_prompt.contains("do not change the physics model"));
}

#[test]
fn best_attempt_survives_a_later_regression() {
    // Iteration 1: design-faithful, score 5 (below the bar, no convergence).
    // Iteration 2: regression to score 3. The final answer is iteration 1.
    let mut model = ScriptedModel::new([
        fenced("echo run one"),
        APPROVE.to_string(),
        analysis(7),
        alignment(5, true),
        fenced("echo run two"),
        APPROVE.to_string(),
        analysis(7),
        alignment(3, true),
    ]);
    let outcome = controller(2)
        .run(&mut model, &sh_sandbox(), &fallback::bell_pair())
        .unwrap();

    assert!(outcome.valid);
    assert!(!outcome.converged);
    assert_eq!(outcome.confidence, Confidence::Medium);
    assert_eq!(outcome.attempt.iteration, 1);
    assert_eq!(
        outcome.attempt.alignment.as_ref().unwrap().alignment_score,
        5
    );
    // Both iterations remain in the audit trail, in order.
    assert_eq!(outcome.history.len(), 2);
    assert_eq!(outcome.history[1].iteration, 2);
}

#[test]
fn returned_score_is_never_below_the_best_seen() {
    // Mixed run: faithful 4, unfaithful 9, faithful 2.
    let mut model = ScriptedModel::new([
        fenced("echo a"),
        APPROVE.to_string(),
        analysis(6),
        alignment(4, true),
        fenced("echo b"),
        APPROVE.to_string(),
        analysis(6),
        alignment(9, false),
        fenced("echo c"),
        APPROVE.to_string(),
        analysis(6),
        alignment(2, true),
    ]);
    let outcome = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::bell_pair())
        .unwrap();

    let best_faithful = outcome
        .history
        .iter()
        .filter_map(|a| a.alignment.as_ref())
        .filter(|a| a.actually_models_design)
        .map(|a| a.alignment_score)
        .max()
        .unwrap();
    assert_eq!(best_faithful, 4);
    assert_eq!(
        outcome.attempt.alignment.as_ref().unwrap().alignment_score,
        best_faithful
    );
    // The unfaithful 9 never becomes the answer.
    assert!(outcome.attempt.alignment.as_ref().unwrap().actually_models_design);
}

#[test]
fn pre_review_rejection_skips_execution_and_threads_feedback() {
    let mut model = ScriptedModel::new([
        fenced("echo wrong physics"),
        reject("no beam splitter anywhere in the code"),
        fenced("echo fixed"),
        APPROVE.to_string(),
        analysis(8),
        alignment(8, true),
    ]);
    let outcome = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::hong_ou_mandel())
        .unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.iterations_used, 2);
    assert_eq!(outcome.history[0].outcome, AttemptOutcome::RejectedPreReview);
    assert!(outcome.history[0].execution.is_none(), "rejected code must not run");
    // Feedback threading: the reviewer's itemized gap appears verbatim
    // in the next generation prompt.
    assert!(model.prompts()[2].contains("no beam splitter anywhere in the code"));
}

#[test]
fn empty_code_response_counts_as_a_rejected_iteration() {
    let mut model = ScriptedModel::new([
        String::new(),
        fenced("echo ok"),
        APPROVE.to_string(),
        analysis(8),
        alignment(8, true),
    ]);
    let outcome = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::minimal_beam())
        .unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.history[0].outcome, AttemptOutcome::RejectedPreReview);
    assert!(model.prompts()[1].contains("contained no code"));
}

#[test]
fn timeout_is_treated_as_execution_feedback_not_a_hang() {
    let sandbox = Sandbox::new(SandboxConfig {
        interpreter: "/bin/sh".to_string(),
        interpreter_args: Vec::new(),
        source_name: "run.sh".to_string(),
        timeout: Duration::from_secs(2),
    });
    let mut model = ScriptedModel::new([
        fenced("while true; do :; done"),
        APPROVE.to_string(),
    ]);
    let started = std::time::Instant::now();
    let outcome = controller(1)
        .run(&mut model, &sandbox, &fallback::minimal_beam())
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!outcome.valid);
    assert_eq!(outcome.history[0].outcome, AttemptOutcome::ExecutionFailed);
    assert!(outcome.history[0]
        .execution
        .as_ref()
        .unwrap()
        .timed_out);
}

#[test]
fn transport_error_aborts_mid_loop() {
    let mut model = ScriptedModel::new([fenced("echo ok")]);
    model.push_error(crate::llm::LlmError::RateLimited("429".into()));
    let err = controller(3)
        .run(&mut model, &sh_sandbox(), &fallback::minimal_beam())
        .unwrap_err();
    assert!(matches!(err, crate::llm::LlmError::RateLimited(_)));
}

#[test]
fn always_misaligned_critic_terminates_at_budget() {
    // Four calls per iteration, never converges,
    // exits exactly at the budget.
    let mut responses = Vec::new();
    for i in 0..4 {
        responses.push(fenced(&format!("echo attempt {i}")));
        responses.push(APPROVE.to_string());
        responses.push(analysis(5));
        responses.push(alignment(2, false));
    }
    let mut model = ScriptedModel::new(responses);
    let outcome = controller(4)
        .run(&mut model, &sh_sandbox(), &fallback::bell_pair())
        .unwrap();

    assert!(!outcome.valid);
    assert_eq!(outcome.iterations_used, 4);
    assert_eq!(outcome.history.len(), 4);
    assert_eq!(model.remaining(), 0);
}
