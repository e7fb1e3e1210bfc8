//! End-to-end batch runs against scripted collaborators.
//!
//! Covers per-task isolation, scoring, result-directory artifacts (traces,
//! `log_files.txt`) and resume filtering.

use std::fs;

use webrunner::batch::{Collaborators, run_batch};
use webrunner::core::scorer::ObservationWeights;
use webrunner::core::types::Action;
use webrunner::io::config::RunnerConfig;
use webrunner::io::results::unfinished_tasks;
use webrunner::step::{Controller, TaskFinish};
use webrunner::test_support::{
    FakePage, FixedEvaluator, RecordingRenderer, ScriptedAgent, ScriptedEnvironment,
    ScriptedReply, ScriptedStep, TaskWorkspace, click,
};

fn controller(save_trace: bool) -> Controller {
    let mut config = RunnerConfig::default();
    config.save_trace = save_trace;
    config.feedback.settle_ms = 0;
    Controller::new(config, ObservationWeights::default())
}

#[test]
fn failing_task_is_isolated_and_scored_zero() {
    let workspace = TaskWorkspace::new().expect("workspace");
    let tasks = vec![
        workspace.write_task(0).expect("task 0"),
        workspace.write_task(1).expect("task 1"),
        workspace.write_task(2).expect("task 2"),
    ];
    let results = workspace.result_dir().expect("results");

    let mut agent = ScriptedAgent::new(vec![
        // task 0: add to cart, then stop
        ScriptedReply::Action(click(3)),
        ScriptedReply::Action(Action::stop("added")),
        // task 1: the environment fails on the first step
        ScriptedReply::Action(click(5)),
        // task 2: parse failure becomes a stop
        ScriptedReply::ParseError("no action found".to_string()),
    ]);
    let mut env = ScriptedEnvironment::new("[1] [BUTTON] [Add to Cart]", FakePage::new())
        .with_steps(vec![
            ScriptedStep::new("[1] [StaticText] [Added]").with_page(
                FakePage::new().with_text("a.action.showcart .counter-number", "1"),
            ),
            ScriptedStep::failing("page crashed"),
        ]);
    let mut renderer = RecordingRenderer::default();
    let evaluator = FixedEvaluator::new(&[("0", 1.0), ("2", 1.0)]);

    let mut seen = Vec::new();
    let outcome = run_batch(
        &controller(false),
        Collaborators {
            agent: &mut agent,
            env: &mut env,
            renderer: &mut renderer,
            evaluator: &evaluator,
        },
        &tasks,
        &results,
        |score| seen.push(score.task_file.clone()),
    )
    .expect("batch");

    assert_eq!(seen, tasks);
    assert_eq!(outcome.scores.len(), 3);
    assert_eq!(outcome.scores[0].score, 1.0);
    assert_eq!(outcome.scores[0].finish, Some(TaskFinish::AgentStop));
    assert_eq!(outcome.scores[1].score, 0.0);
    assert!(
        outcome.scores[1]
            .error
            .as_deref()
            .is_some_and(|err| err.contains("page crashed"))
    );
    assert!(matches!(
        outcome.scores[2].finish,
        Some(TaskFinish::AgentError { .. })
    ));
    assert_eq!(outcome.average(), Some(2.0 / 3.0));
    assert_eq!(agent.resets(), ["0", "1", "2"]);
    assert_eq!(renderer.closed, 3);

    let errors = fs::read_to_string(results.error_path()).expect("error.txt");
    assert!(errors.contains("1.json"));
    assert!(!errors.contains("0.json"));
    assert!(results.root().join("config.json").is_file());
}

#[test]
fn traces_and_log_file_are_recorded() {
    let workspace = TaskWorkspace::new().expect("workspace");
    let tasks = vec![workspace.write_task(7).expect("task")];
    let log_file = workspace.root().join("log_files/log_run.log");
    let results = workspace
        .result_dir()
        .expect("results")
        .with_log_file(&log_file);

    let mut agent = ScriptedAgent::new(vec![ScriptedReply::Action(Action::stop("done"))]);
    let mut env = ScriptedEnvironment::new("obs", FakePage::new());
    let mut renderer = RecordingRenderer::default();
    let evaluator = FixedEvaluator::default();

    run_batch(
        &controller(true),
        Collaborators {
            agent: &mut agent,
            env: &mut env,
            renderer: &mut renderer,
            evaluator: &evaluator,
        },
        &tasks,
        &results,
        |_| {},
    )
    .expect("batch");

    assert_eq!(env.traces(), [results.trace_path("7")]);
    assert!(results.root().join("traces/7.zip").is_file());
    let logs = fs::read_to_string(results.root().join("log_files.txt")).expect("log_files.txt");
    assert_eq!(logs, format!("{}\n", log_file.display()));
}

#[test]
fn missing_task_file_does_not_stop_the_batch() {
    let workspace = TaskWorkspace::new().expect("workspace");
    let tasks = vec![
        workspace.root().join("tasks/404.json"),
        workspace.write_task(5).expect("task"),
    ];
    let results = workspace.result_dir().expect("results");

    let mut agent = ScriptedAgent::new(vec![ScriptedReply::Action(Action::stop("ok"))]);
    let mut env = ScriptedEnvironment::new("obs", FakePage::new());
    let mut renderer = RecordingRenderer::default();
    let evaluator = FixedEvaluator::new(&[("5", 1.0)]);

    let outcome = run_batch(
        &controller(false),
        Collaborators {
            agent: &mut agent,
            env: &mut env,
            renderer: &mut renderer,
            evaluator: &evaluator,
        },
        &tasks,
        &results,
        |_| {},
    )
    .expect("batch");

    assert_eq!(outcome.failed().count(), 1);
    assert_eq!(outcome.scores[0].task_id, None);
    assert_eq!(outcome.scores[1].task_id.as_deref(), Some("5"));
    assert_eq!(outcome.average(), Some(0.5));
}

#[test]
fn rendered_tasks_are_skipped_on_resume() {
    let workspace = TaskWorkspace::new().expect("workspace");
    let tasks = vec![
        workspace.write_task(0).expect("task 0"),
        workspace.write_task(1).expect("task 1"),
    ];
    let results = workspace.result_dir().expect("results");

    let mut agent = ScriptedAgent::new(vec![ScriptedReply::Action(Action::stop("ok"))]);
    let mut env = ScriptedEnvironment::new("obs", FakePage::new());
    let mut renderer = RecordingRenderer::default();
    let evaluator = FixedEvaluator::default();

    run_batch(
        &controller(false),
        Collaborators {
            agent: &mut agent,
            env: &mut env,
            renderer: &mut renderer,
            evaluator: &evaluator,
        },
        &tasks[..1],
        &results,
        |_| {},
    )
    .expect("batch");

    let pending = unfinished_tasks(&tasks, results.root()).expect("unfinished");
    assert_eq!(pending, vec![tasks[1].clone()]);
}
