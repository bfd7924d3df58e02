//! End-to-end workflow execution through the dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use orchestrator::dispatch::{Dispatcher, WorkflowRequest};
use orchestrator::error::{CompilationError, ConfigError};
use orchestrator::execution::{Engine, ExecutionContext, WorkflowStatus};
use orchestrator::registry::{ProcessorOutput, ProcessorRegistry, StepRegistry};
use orchestrator::remote::{Protocol, RemoteCall, RemoteTransport, TransportRegistry};
use orchestrator::workflow::{parse_config, OrchestratorConfig, StepDefinition, WorkflowDefinition};

/// Counts every processor and remote invocation.
#[derive(Default)]
struct Calls {
    count: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl Calls {
    fn record(&self, name: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(name.to_string());
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

/// Every named processor outputs `<name>-done`; `fail` always fails.
fn processors(calls: &Arc<Calls>) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::with_builtins();

    for name in ["s1", "p1", "p2", "p3", "outer", "n1", "n2", "n3"] {
        let calls = Arc::clone(calls);
        let marker = name.to_string();
        registry.register(name, move |_: &ExecutionContext| -> ProcessorOutput {
            calls.record(&marker);
            Ok(Some(json!(format!("{}-done", marker))))
        });
    }

    let fail_calls = Arc::clone(calls);
    registry.register("fail", move |_: &ExecutionContext| -> ProcessorOutput {
        fail_calls.record("fail");
        Err("boom".to_string())
    });

    registry
}

/// HTTP transport failing for endpoints on `down.local`.
fn transports(calls: &Arc<Calls>) -> TransportRegistry {
    let calls = Arc::clone(calls);
    let http: Arc<dyn RemoteTransport> =
        Arc::new(move |call: &RemoteCall| -> Result<Option<Value>, String> {
            calls.record(&call.step_id);
            if call.endpoint.contains("down.local") {
                Err("HTTP 503 Service Unavailable".to_string())
            } else {
                Ok(Some(json!({ "from": call.step_id })))
            }
        });
    TransportRegistry::new().with(Protocol::Http, http)
}

fn dispatcher(calls: &Arc<Calls>, workflows: Vec<WorkflowDefinition>) -> Dispatcher {
    let config = OrchestratorConfig {
        workflows,
        ..OrchestratorConfig::default()
    };
    let steps = StepRegistry::new(processors(calls), transports(calls));
    Dispatcher::from_config(&config, &steps, Engine::with_max_parallel(4)).unwrap()
}

fn workflow_w(first: &str) -> WorkflowDefinition {
    WorkflowDefinition::new("W", "End to end")
        .with_step(StepDefinition::local("S1", first).with_output_key("x"))
        .with_step(StepDefinition::local("P1", "p1").with_output_key("y").in_parallel())
        .with_step(StepDefinition::remote_http("P2", "http://down.local/score").in_parallel())
}

#[test]
fn sequential_then_parallel_with_tolerated_failure() {
    let calls = Arc::new(Calls::default());
    let dispatcher = dispatcher(&calls, vec![workflow_w("s1")]);

    let response = dispatcher.execute(&WorkflowRequest::new("W", json!({ "subject": 1 })));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(response.results.get("x"), Some(&json!("s1-done")));
    assert_eq!(response.results.get("y"), Some(&json!("p1-done")));
    assert_eq!(
        response.results.get("P2.error"),
        Some(&json!("HTTP 503 Service Unavailable"))
    );
    assert!(response.error().is_none());
    assert_eq!(calls.count(), 3);
    assert_eq!(calls.order()[0], "s1");
}

#[test]
fn sequential_failure_stops_the_run() {
    let calls = Arc::new(Calls::default());
    let dispatcher = dispatcher(&calls, vec![workflow_w("fail")]);

    let response = dispatcher.execute(&WorkflowRequest::new("W", json!({})));

    assert_eq!(response.status, WorkflowStatus::Failed);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.error(), Some("Step 'S1' failed: boom"));
    // Only S1 ran; neither parallel step was started
    assert_eq!(calls.order(), vec!["fail"]);
}

#[test]
fn sequential_steps_after_a_failure_never_run() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("seq", "Sequential")
        .with_step(StepDefinition::local("a", "s1"))
        .with_step(StepDefinition::local("b", "fail"))
        .with_step(StepDefinition::local("c", "n1"))
        .with_step(StepDefinition::local("d", "n2"));
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("seq", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Failed);
    assert_eq!(calls.order(), vec!["s1", "fail"]);
}

#[test]
fn parallel_steps_write_distinct_keys() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("fan-out", "Fan out")
        .with_step(StepDefinition::local("A", "p1").with_output_key("a").in_parallel())
        .with_step(StepDefinition::local("B", "p2").with_output_key("b").in_parallel())
        .with_step(StepDefinition::local("C", "p3").with_output_key("c").in_parallel());
    let dispatcher = dispatcher(&calls, vec![workflow]);

    for _ in 0..20 {
        let response = dispatcher.execute(&WorkflowRequest::new("fan-out", Value::Null));

        assert_eq!(response.status, WorkflowStatus::Completed);
        assert_eq!(response.results.get("a"), Some(&json!("p1-done")));
        assert_eq!(response.results.get("b"), Some(&json!("p2-done")));
        assert_eq!(response.results.get("c"), Some(&json!("p3-done")));
        assert_eq!(response.results.len(), 3);
    }
}

#[test]
fn all_parallel_failures_still_complete() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("flaky", "Flaky")
        .with_step(StepDefinition::local("A", "fail").in_parallel())
        .with_step(StepDefinition::remote_http("B", "http://down.local/b").in_parallel())
        .with_step(StepDefinition::remote_http("C", "http://up.local/c").with_output_key("c").in_parallel());
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("flaky", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(response.results.get("A.error"), Some(&json!("boom")));
    assert!(response.results.contains_key("B.error"));
    assert_eq!(response.results.get("c"), Some(&json!({ "from": "C" })));
    assert_eq!(calls.count(), 3);
}

#[test]
fn composite_outer_failure_skips_nested_steps() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("comp", "Composite").with_step(
        StepDefinition::composite(
            "C",
            vec![StepDefinition::local("N1", "n1"), StepDefinition::local("N2", "n2")],
        )
        .with_processor("fail"),
    );
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("comp", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Failed);
    assert_eq!(response.error(), Some("Step 'C' failed: boom"));
    assert_eq!(calls.order(), vec!["fail"]);
}

#[test]
fn composite_nested_failure_is_fail_fast() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("comp", "Composite").with_step(
        StepDefinition::composite(
            "C",
            vec![
                StepDefinition::local("N1", "n1").with_output_key("n1"),
                StepDefinition::local("N2", "fail"),
                StepDefinition::local("N3", "n3"),
            ],
        )
        .with_processor("outer"),
    );
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("comp", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Failed);
    assert_eq!(
        response.error(),
        Some("Step 'C' failed: Nested step 'N2' failed: boom")
    );
    assert_eq!(calls.order(), vec!["outer", "n1", "fail"]);
    // Outputs of nested steps that completed stay visible
    assert_eq!(response.results.get("n1"), Some(&json!("n1-done")));
}

#[test]
fn composite_success_outputs_shared_snapshot() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("comp", "Composite").with_step(
        StepDefinition::composite(
            "C",
            vec![
                StepDefinition::local("N1", "n1").with_output_key("first"),
                StepDefinition::local("N2", "n2").with_output_key("second"),
            ],
        )
        .with_output_key("combined"),
    );
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("comp", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(
        response.results.get("combined"),
        Some(&json!({ "first": "n1-done", "second": "n2-done" }))
    );
}

#[test]
fn empty_composite_fails_to_compile() {
    let calls = Arc::new(Calls::default());
    let steps = StepRegistry::new(processors(&calls), transports(&calls));

    assert_eq!(
        steps.compile(&[StepDefinition::composite("C", vec![])]).unwrap_err(),
        CompilationError::EmptyComposite("C".to_string())
    );
    assert!(steps
        .compile(&[StepDefinition::composite("C", vec![StepDefinition::local("N1", "n1")])])
        .is_ok());
}

#[test]
fn unknown_workflow_does_not_affect_others() {
    let calls = Arc::new(Calls::default());
    let dispatcher = dispatcher(&calls, vec![workflow_w("s1")]);

    let missing = dispatcher.execute(&WorkflowRequest::new("missing", Value::Null));
    assert_eq!(missing.status, WorkflowStatus::Failed);
    assert_eq!(missing.error(), Some("Workflow not found: missing"));
    assert_eq!(calls.count(), 0);

    let response = dispatcher.execute(&WorkflowRequest::new("W", Value::Null));
    assert_eq!(response.status, WorkflowStatus::Completed);
}

#[test]
fn parallel_phase_disabled() {
    let calls = Arc::new(Calls::default());
    let dispatcher = dispatcher(&calls, vec![workflow_w("s1").with_parallel_execution(false)]);

    let response = dispatcher.execute(&WorkflowRequest::new("W", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(calls.order(), vec!["s1"]);
    assert_eq!(response.results.len(), 1);
}

#[test]
fn timeout_fails_with_completed_outputs_kept() {
    let mut processors = ProcessorRegistry::with_builtins();
    processors.register("quick", |_: &ExecutionContext| -> ProcessorOutput {
        Ok(Some(json!("quick")))
    });
    processors.register("stall", |_: &ExecutionContext| -> ProcessorOutput {
        std::thread::sleep(std::time::Duration::from_millis(2500));
        Ok(Some(json!("late")))
    });

    let config = OrchestratorConfig {
        workflows: vec![WorkflowDefinition::new("slow", "Slow")
            .with_timeout_seconds(1)
            .with_step(StepDefinition::local("Q", "quick").with_output_key("q"))
            .with_step(StepDefinition::local("S", "stall").with_output_key("s").in_parallel())],
        ..OrchestratorConfig::default()
    };
    let steps = StepRegistry::new(processors, TransportRegistry::new());
    let dispatcher = Dispatcher::from_config(&config, &steps, Engine::new()).unwrap();

    let response = dispatcher.execute(&WorkflowRequest::new("slow", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Failed);
    assert_eq!(response.results.get("q"), Some(&json!("quick")));
    assert!(!response.results.contains_key("s"));
    assert_eq!(response.error(), Some("Workflow 'slow' timed out after 1s"));
}

#[test]
fn workflows_load_from_yaml() {
    let yaml = r#"
settings:
  maxParallel: 2
  defaultTimeoutSeconds: 30
workflows:
  - id: subject-matching
    name: Subject matching
    steps:
      - id: load
        type: local
        processor: echo
        outputKey: subject
      - id: score
        type: remote-http
        endpoint: http://up.local/score
        parallel: true
        outputKey: score
      - id: enrich
        type: composite
        parallel: true
        outputKey: enriched
        nestedSteps:
          - id: lookup
            type: local
            processor: n1
            outputKey: lookup
"#;
    let config = parse_config(yaml, "inline").unwrap();
    assert_eq!(config.settings.max_parallel, Some(2));

    let calls = Arc::new(Calls::default());
    let steps = StepRegistry::new(processors(&calls), transports(&calls))
        .with_default_timeout(config.settings.default_timeout_seconds);
    let dispatcher = Dispatcher::from_config(&config, &steps, Engine::with_max_parallel(2)).unwrap();

    let response = dispatcher.execute(&WorkflowRequest::new("subject-matching", json!({ "id": 7 })));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(response.results.get("subject"), Some(&json!({ "id": 7 })));
    assert_eq!(response.results.get("score"), Some(&json!({ "from": "score" })));
    assert_eq!(response.results.get("lookup"), Some(&json!("n1-done")));
    assert!(response.results.contains_key("enriched"));
}

#[test]
fn invalid_workflow_in_yaml_is_reported() {
    let yaml = r#"
workflows:
  - id: broken
    steps:
      - id: call
        type: remote-grpc
        endpoint: grpc://risk.local:9000
"#;
    let config = parse_config(yaml, "inline").unwrap();
    let calls = Arc::new(Calls::default());
    let steps = StepRegistry::new(processors(&calls), transports(&calls));

    let err = Dispatcher::from_config(&config, &steps, Engine::new()).err().unwrap();
    match err {
        ConfigError::Compilation { workflow, source } => {
            assert_eq!(workflow, "broken");
            assert!(matches!(source, CompilationError::MissingTransport { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn demo_configuration_runs() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/workflows.yaml");
    let config = orchestrator::load_config(path).unwrap();

    let calls = Arc::new(Calls::default());
    let steps = StepRegistry::new(ProcessorRegistry::with_builtins(), transports(&calls));
    let dispatcher = Dispatcher::from_config(&config, &steps, Engine::new()).unwrap();
    assert_eq!(
        dispatcher.list_workflows(),
        vec!["echo-and-snapshot", "subject-matching"]
    );

    let response = dispatcher.execute(&WorkflowRequest::new(
        "echo-and-snapshot",
        json!({ "subjectId": 42 }),
    ));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(response.results.get("request"), Some(&json!({ "subjectId": 42 })));
    assert_eq!(
        response.results.get("copy"),
        Some(&json!({ "request": { "subjectId": 42 } }))
    );
    assert!(response.results.contains_key("captured"));

    // Steps reading the whole blackboard never share a parallel batch
    let matching = config
        .workflows
        .iter()
        .find(|w| w.id == "subject-matching")
        .unwrap();
    let parallel: Vec<&str> = matching.parallel_steps().map(|s| s.id.as_str()).collect();
    assert_eq!(parallel, vec!["score"]);

    let response = dispatcher.execute(&WorkflowRequest::new(
        "subject-matching",
        json!({ "subjectId": 42 }),
    ));
    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(
        response.results.get("audit"),
        Some(&json!({ "subject": { "subjectId": 42 } }))
    );
    assert_eq!(response.results.get("score"), Some(&json!({ "from": "score" })));
}

#[test]
fn parallel_composite_nested_failure_is_tolerated() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("fan-out", "Fan out")
        .with_step(
            StepDefinition::composite(
                "C",
                vec![
                    StepDefinition::local("N1", "n1").with_output_key("n1"),
                    StepDefinition::local("N2", "fail"),
                    StepDefinition::local("N3", "n3").with_output_key("n3"),
                ],
            )
            .with_output_key("combined")
            .in_parallel(),
        )
        .with_step(StepDefinition::local("P1", "p1").with_output_key("p1").in_parallel())
        .with_step(StepDefinition::local("P2", "p2").with_output_key("p2").in_parallel());
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("fan-out", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert!(response.error().is_none());
    assert_eq!(
        response.results.get("C.error"),
        Some(&json!("Nested step 'N2' failed: boom"))
    );
    assert_eq!(response.results.get("p1"), Some(&json!("p1-done")));
    assert_eq!(response.results.get("p2"), Some(&json!("p2-done")));
    assert_eq!(response.results.get("n1"), Some(&json!("n1-done")));
    assert!(!response.results.contains_key("combined"));
    assert!(!response.results.contains_key("n3"));
    assert!(!calls.order().contains(&"n3".to_string()));
}

#[test]
fn parallel_composite_outer_failure_is_tolerated() {
    let calls = Arc::new(Calls::default());
    let workflow = WorkflowDefinition::new("fan-out", "Fan out")
        .with_step(
            StepDefinition::composite("C", vec![StepDefinition::local("N1", "n1")])
                .with_processor("fail")
                .in_parallel(),
        )
        .with_step(StepDefinition::local("P1", "p1").with_output_key("p1").in_parallel());
    let dispatcher = dispatcher(&calls, vec![workflow]);

    let response = dispatcher.execute(&WorkflowRequest::new("fan-out", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(response.results.get("C.error"), Some(&json!("boom")));
    assert_eq!(response.results.get("p1"), Some(&json!("p1-done")));
    assert!(!calls.order().contains(&"n1".to_string()));
}

#[test]
fn oversized_timeout_runs_to_completion() {
    let yaml = r#"
workflows:
  - id: patient
    timeoutSeconds: 18446744073709551615
    steps:
      - id: first
        type: local
        processor: s1
        outputKey: x
      - id: second
        type: local
        processor: p1
        parallel: true
        outputKey: y
"#;
    let config = parse_config(yaml, "inline").unwrap();
    let calls = Arc::new(Calls::default());
    let steps = StepRegistry::new(processors(&calls), transports(&calls));
    let dispatcher = Dispatcher::from_config(&config, &steps, Engine::new()).unwrap();

    let response = dispatcher.execute(&WorkflowRequest::new("patient", Value::Null));

    assert_eq!(response.status, WorkflowStatus::Completed);
    assert_eq!(response.results.get("x"), Some(&json!("s1-done")));
    assert_eq!(response.results.get("y"), Some(&json!("p1-done")));
}
