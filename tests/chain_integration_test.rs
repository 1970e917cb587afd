//! 推理链集成测试：用带延迟 / 计数的假工具驱动完整编排流程

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use reasoning_chain::chain::{
    ArgValue, ChainEvent, ChainPlan, ChainPlanBuilder, ChainStatus, ChainType, EventSink,
    ExecutionLimits, Predicate, Query, ResponseMode, StepStatus,
};
use reasoning_chain::config::{ChainSettings, FixtureSection};
use reasoning_chain::core::{
    ChainError, ErrorKind, ReasoningOrchestrator, ReasoningRequest, ReasoningResponse,
};
use reasoning_chain::llm::MockLlmClient;
use reasoning_chain::planning::{LlmPlanner, StaticPlanner};
use reasoning_chain::synthesis::TemplateSynthesizer;
use reasoning_chain::tools::{register_builtin, FixtureTool, Tool, ToolRegistry};

/// 延迟后返回固定值，并统计调用次数
struct DelayTool {
    name: String,
    delay: Duration,
    value: Value,
    calls: Arc<AtomicUsize>,
}

impl DelayTool {
    fn new(name: &str, delay_ms: u64, value: Value) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::from_millis(delay_ms),
            value,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "delayed test tool"
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.value.clone())
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn description(&self) -> &str {
        "always reports an error"
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        Err("upstream unavailable".to_string())
    }
}

fn orchestrator(plan: ChainPlan, registry: ToolRegistry) -> ReasoningOrchestrator {
    ReasoningOrchestrator::new(
        Arc::new(StaticPlanner::new(plan)),
        Arc::new(registry),
        Arc::new(TemplateSynthesizer::new()),
        &ChainSettings::default(),
    )
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ChainEvent>) -> Vec<ChainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// 每个 StepStarted 之前，其全部依赖都已出现终态事件；且同一时刻最多一个步骤在运行
fn assert_dependencies_terminal_before_start(plan: &ChainPlan, events: &[ChainEvent]) {
    let mut terminal = HashSet::new();
    let mut running = 0usize;
    for event in events {
        match event {
            ChainEvent::StepStarted { step, .. } => {
                let spec = plan.step(*step).unwrap();
                for dep in &spec.depends_on {
                    assert!(terminal.contains(dep), "step {step} started before dependency {dep}");
                }
                running += 1;
                assert!(running <= 1, "more than one step running in a sequential chain");
            }
            ChainEvent::StepFinished { step, .. } => {
                terminal.insert(*step);
                running -= 1;
            }
            ChainEvent::StepSkipped { step, .. } => {
                terminal.insert(*step);
            }
            _ => {}
        }
    }
}

fn revenue_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtin(&mut registry);
    let section = FixtureSection {
        description: "revenue by period".to_string(),
        key_arg: Some("period".to_string()),
        results: HashMap::from([
            ("current_month".to_string(), json!(45000)),
            ("last_month".to_string(), json!(58500)),
        ]),
        result: None,
    };
    registry.register(FixtureTool::from_config("get_revenue_data", &section));
    registry
}

fn revenue_plan() -> ChainPlan {
    ChainPlanBuilder::new(ChainType::Sequential)
        .reasoning("fetch both periods, then compare")
        .step(1, "What is the current revenue?", "get_revenue_data")
        .arg(1, "period", ArgValue::literal("current_month"))
        .step(2, "What was last month's revenue?", "get_revenue_data")
        .arg(2, "period", ArgValue::literal("last_month"))
        .step(3, "How did revenue change?", "compare_metrics")
        .arg(3, "metric_a", ArgValue::reference(1))
        .arg(3, "metric_b", ArgValue::reference(2))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_revenue_down_scenario() {
    let run = orchestrator(revenue_plan(), revenue_registry())
        .run(
            Query::new("Why is revenue down this month?"),
            CancellationToken::new(),
            EventSink::none(),
        )
        .await
        .unwrap();

    let compare = &run.results[2];
    assert_eq!(compare.status, StepStatus::Completed);
    let result = compare.result.as_ref().unwrap();
    assert!((result["delta"].as_f64().unwrap() + 13500.0).abs() < 0.1);
    assert!((result["delta_pct"].as_f64().unwrap() + 23.08).abs() < 0.1);
    assert_eq!(run.status, ChainStatus::Done);
    assert!(run.final_answer.contains("-13500.00 (-23.08%)"));
}

#[tokio::test]
async fn test_sequential_dependencies_terminal_before_start() {
    let mut registry = ToolRegistry::new();
    registry.register(DelayTool::new("slow", 15, json!({"value": 1})));
    registry.register(DelayTool::new("fast", 1, json!({"value": 2})));
    let plan = ChainPlanBuilder::new(ChainType::Sequential)
        .step(1, "slow fetch", "slow")
        .step(2, "fast fetch", "fast")
        .step(3, "combine", "fast")
        .arg(3, "a", ArgValue::field(1, "value"))
        .arg(3, "b", ArgValue::field(2, "value"))
        .step(4, "follow up", "slow")
        .depends_on(4, [3])
        .build()
        .unwrap();

    let (sink, mut rx) = EventSink::channel();
    let run = orchestrator(plan.clone(), registry)
        .run(Query::new("sequential"), CancellationToken::new(), sink)
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_dependencies_terminal_before_start(&plan, &events);
    assert_eq!(run.summary.completed, 4);
}

#[tokio::test]
async fn test_parallel_final_answer_independent_of_completion_order() {
    async fn answer(delay_a: u64, delay_b: u64) -> String {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry);
        registry.register(DelayTool::new("coach_a", delay_a, json!({"score": 82})));
        registry.register(DelayTool::new("coach_b", delay_b, json!({"score": 74})));
        let plan = ChainPlanBuilder::new(ChainType::Parallel)
            .step(1, "Coach A performance", "coach_a")
            .step(2, "Coach B performance", "coach_b")
            .step(3, "Compare coaches", "compare_metrics")
            .arg(3, "metric_a", ArgValue::reference(1))
            .arg(3, "metric_b", ArgValue::reference(2))
            .build()
            .unwrap();
        orchestrator(plan, registry)
            .run(Query::new("Compare Coach A vs Coach B"), CancellationToken::new(), EventSink::none())
            .await
            .unwrap()
            .final_answer
    }

    let a_first = answer(1, 30).await;
    let b_first = answer(30, 1).await;
    assert_eq!(a_first, b_first);
}

#[tokio::test]
async fn test_parallel_steps_run_concurrently() {
    let mut registry = ToolRegistry::new();
    let mut builder = ChainPlanBuilder::new(ChainType::Parallel);
    for n in 1..=4 {
        let name = format!("fetch_{n}");
        registry.register(DelayTool::new(&name, 60, json!({"value": n})));
        builder = builder.step(n, format!("fetch {n}"), name);
    }
    let start = std::time::Instant::now();
    let run = orchestrator(builder.build().unwrap(), registry)
        .run(Query::new("parallel"), CancellationToken::new(), EventSink::none())
        .await
        .unwrap();
    assert_eq!(run.summary.completed, 4);
    // 四个 60ms 步骤在并行上限 4 下应明显快于串行的 240ms
    assert!(start.elapsed() < Duration::from_millis(200));
}

fn health_plan(on_true: [u32; 2], on_false: [u32; 1]) -> ChainPlan {
    ChainPlanBuilder::new(ChainType::Conditional)
        .step(1, "Did red zone clients increase?", "get_health_scores")
        .branch(
            1,
            Predicate::FieldGreaterThan {
                left: "current".into(),
                right: "previous".into(),
            },
            on_true,
            on_false,
        )
        .step(2, "Which clients moved to red?", "analyze")
        .step(3, "What caused the increase?", "analyze")
        .step(4, "Report stable status", "report")
        .build()
        .unwrap()
}

fn health_registry(scores: Value, analyze_calls: &Arc<AtomicUsize>, report_calls: &Arc<AtomicUsize>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(FixtureTool::constant("get_health_scores", scores));
    let mut analyze = DelayTool::new("analyze", 1, json!({"count": 6}));
    analyze.calls = Arc::clone(analyze_calls);
    let mut report = DelayTool::new("report", 1, json!({"status": "stable"}));
    report.calls = Arc::clone(report_calls);
    registry.register(analyze);
    registry.register(report);
    registry
}

#[tokio::test]
async fn test_conditional_red_zone_scenario() {
    let analyze_calls = Arc::new(AtomicUsize::new(0));
    let report_calls = Arc::new(AtomicUsize::new(0));
    let registry = health_registry(
        json!({"current": 15, "previous": 9, "zone": "red"}),
        &analyze_calls,
        &report_calls,
    );

    let (sink, mut rx) = EventSink::channel();
    let run = orchestrator(health_plan([2, 3], [4]), registry)
        .run(
            Query::new("What's causing the increase in red zone clients?"),
            CancellationToken::new(),
            sink,
        )
        .await
        .unwrap();

    let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Completed,
            StepStatus::Completed,
            StepStatus::Completed,
            StepStatus::Skipped
        ]
    );
    assert_eq!(run.summary.skipped, 1);
    assert_eq!(analyze_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report_calls.load(Ordering::SeqCst), 0);
    assert!(drain(&mut rx).contains(&ChainEvent::BranchResolved {
        predicate_on: 1,
        taken: true
    }));
}

#[tokio::test]
async fn test_conditional_arms_mutually_exclusive() {
    for (scores, taken_arm) in [
        (json!({"current": 15, "previous": 9}), vec![2u32, 3]),
        (json!({"current": 4, "previous": 9}), vec![4u32]),
    ] {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = health_registry(scores, &calls, &Arc::new(AtomicUsize::new(0)));
        let plan = health_plan([2, 3], [4]);
        let run = orchestrator(plan, registry)
            .run(Query::new("red zone?"), CancellationToken::new(), EventSink::none())
            .await
            .unwrap();

        for result in run.results.iter().filter(|r| r.step_number != 1) {
            if taken_arm.contains(&result.step_number) {
                assert_ne!(result.status, StepStatus::Skipped);
            } else {
                assert_eq!(result.status, StepStatus::Skipped);
            }
        }
        assert!(run.summary.is_balanced());
    }
}

#[tokio::test]
async fn test_failed_dependency_is_skipped_never_run() {
    let mut registry = ToolRegistry::new();
    registry.register(FailingTool);
    let dependent = DelayTool::new("dependent", 1, json!({"value": 1}));
    let dependent_calls = Arc::clone(&dependent.calls);
    registry.register(dependent);

    for chain_type in [ChainType::Sequential, ChainType::Parallel] {
        let plan = ChainPlanBuilder::new(chain_type)
            .step(1, "fetch", "always_fails")
            .step(2, "use fetch", "dependent")
            .arg(2, "input", ArgValue::reference(1))
            .step(3, "use use", "dependent")
            .depends_on(3, [2])
            .build()
            .unwrap();

        let (sink, mut rx) = EventSink::channel();
        let run = orchestrator(plan, registry.clone())
            .run(Query::new("dependency failure"), CancellationToken::new(), sink)
            .await
            .unwrap();

        assert_eq!(run.results[0].status, StepStatus::Failed);
        assert!(matches!(run.results[0].error, Some(ErrorKind::ToolExecution { .. })));
        assert_eq!(run.results[1].status, StepStatus::Skipped);
        assert_eq!(run.results[2].status, StepStatus::Skipped);
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ChainEvent::StepStarted { step, .. } if *step != 1)));
        assert!(!run.final_answer.is_empty());
    }
    assert_eq!(dependent_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_step_timeout_fails_step_but_chain_answers() {
    let mut registry = ToolRegistry::new();
    registry.register(DelayTool::new("sluggish", 1, json!({"value": 1})));
    let plan = ChainPlanBuilder::new(ChainType::Sequential)
        .step(1, "slow lookup", "sluggish")
        .build()
        .unwrap();
    let settings = ChainSettings {
        step_timeout_ms: 0,
        ..ChainSettings::default()
    };
    let orchestrator = ReasoningOrchestrator::new(
        Arc::new(StaticPlanner::new(plan)),
        Arc::new(registry),
        Arc::new(TemplateSynthesizer::new()),
        &settings,
    );

    let run = orchestrator
        .run(Query::new("slow?"), CancellationToken::new(), EventSink::none())
        .await
        .unwrap();

    assert_eq!(run.results[0].status, StepStatus::Failed);
    assert!(matches!(
        run.results[0].error,
        Some(ErrorKind::Timeout { ref scope, .. }) if scope == "step"
    ));
    assert_eq!(run.status, ChainStatus::Done);
    assert!(!run.final_answer.is_empty());
    assert!(run.final_answer.contains("could not be answered"));
}

#[tokio::test]
async fn test_chain_timeout_aborts_with_balanced_accounting() {
    let mut registry = ToolRegistry::new();
    registry.register(DelayTool::new("quick", 1, json!({"value": 1})));
    registry.register(DelayTool::new("glacial", 5_000, json!({"value": 2})));
    let plan = ChainPlanBuilder::new(ChainType::Sequential)
        .step(1, "quick", "quick")
        .step(2, "glacial", "glacial")
        .step(3, "never reached", "quick")
        .build()
        .unwrap();
    let orchestrator = orchestrator(plan, registry).with_limits(ExecutionLimits {
        step_timeout: Duration::from_secs(10),
        chain_timeout: Duration::from_millis(100),
        max_parallel: 4,
    });

    let run = orchestrator
        .run(Query::new("timeout"), CancellationToken::new(), EventSink::none())
        .await
        .unwrap();

    assert_eq!(run.status, ChainStatus::Aborted);
    let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Skipped]
    );
    assert!(matches!(
        run.results[1].error,
        Some(ErrorKind::Timeout { ref scope, .. }) if scope == "chain"
    ));
    assert!(run.summary.is_balanced());
    assert!(run.final_answer.contains("cut short"));

    let value = serde_json::to_value(ReasoningResponse::from_run(&run)).unwrap();
    assert_eq!(value["success"], false);
    assert!(value["error"].is_string());
    assert_eq!(value["steps"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_cancellation_keeps_completed_results() {
    let mut registry = ToolRegistry::new();
    registry.register(DelayTool::new("quick", 1, json!({"value": 1})));
    registry.register(DelayTool::new("glacial", 5_000, json!({"value": 2})));
    let plan = ChainPlanBuilder::new(ChainType::Parallel)
        .step(1, "quick", "quick")
        .step(2, "glacial", "glacial")
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let run = orchestrator(plan, registry)
        .run(Query::new("cancel"), token, EventSink::none())
        .await
        .unwrap();

    assert!(run.is_aborted());
    assert_eq!(run.results[0].status, StepStatus::Completed);
    assert_eq!(run.results[1].status, StepStatus::Failed);
    assert!(matches!(run.results[1].error, Some(ErrorKind::Cancelled { .. })));
    assert!(run.results[1].execution_time_ms.is_some_and(|ms| ms > 0));
    assert_eq!(run.abort_reason.as_deref(), Some(ChainError::Cancelled.to_string().as_str()));
    assert!(!run.final_answer.contains("Timeout (chain)"));
}

#[tokio::test]
async fn test_compact_response_has_no_steps() {
    let response = orchestrator(revenue_plan(), revenue_registry())
        .handle(
            ReasoningRequest {
                query: "Why is revenue down?".to_string(),
                context: None,
                mode: ResponseMode::Compact,
            },
            CancellationToken::new(),
        )
        .await;

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], true);
    assert!(value.get("steps").is_none());
    assert!(value["answer"].as_str().unwrap().contains("Key findings"));
}

#[tokio::test]
async fn test_full_response_shape() {
    let response = orchestrator(revenue_plan(), revenue_registry())
        .handle(
            ReasoningRequest {
                query: "Why is revenue down?".to_string(),
                context: Some("monthly review".to_string()),
                mode: ResponseMode::Full,
            },
            CancellationToken::new(),
        )
        .await;

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["chain_type"], "sequential");
    assert_eq!(value["steps"][2]["tool_to_use"], "compare_metrics");
    assert_eq!(value["steps"][2]["tool_args"]["metric_a"], "$step_1");
    assert_eq!(value["steps"][2]["status"], "completed");
    assert_eq!(value["execution_summary"]["total_steps"], 3);
    assert_eq!(value["execution_summary"]["completed"], 3);
    assert!(value.get("issues").is_none());
    assert!(value.get("error").is_none());
}

#[tokio::test]
async fn test_planning_error_returns_failure_response() {
    let llm = MockLlmClient::new().fail("planning model unavailable");
    let orchestrator = ReasoningOrchestrator::new(
        Arc::new(LlmPlanner::new(Arc::new(llm), vec![])),
        Arc::new(revenue_registry()),
        Arc::new(TemplateSynthesizer::new()),
        &ChainSettings::default(),
    );

    let response = orchestrator
        .handle(
            ReasoningRequest {
                query: "Why is revenue down?".to_string(),
                context: None,
                mode: ResponseMode::Full,
            },
            CancellationToken::new(),
        )
        .await;

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], false);
    assert!(value["error"].as_str().unwrap().starts_with("Planning error"));
    assert_eq!(value.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn test_llm_planned_chain_end_to_end() {
    let plan_json = r#"{
      "chain_type": "parallel",
      "reasoning": "both periods are independent",
      "steps": [
        {"step_number": 1, "question": "Current revenue?", "tool_to_use": "get_revenue_data", "tool_args": {"period": "current_month"}, "depends_on": []},
        {"step_number": 2, "question": "Last month revenue?", "tool_to_use": "get_revenue_data", "tool_args": {"period": "last_month"}, "depends_on": []},
        {"step_number": 3, "question": "Change?", "tool_to_use": "compare_metrics", "tool_args": {"metric_a": "$step_1", "metric_b": "$step_2"}, "depends_on": [1, 2]},
        {"step_number": 4, "question": "Forecast?", "tool_to_use": "get_forecast", "tool_args": {}, "depends_on": []}
      ]
    }"#;
    let registry = revenue_registry();
    let llm = MockLlmClient::new().reply(plan_json);
    let orchestrator = ReasoningOrchestrator::new(
        Arc::new(LlmPlanner::new(Arc::new(llm), registry.tool_descriptions())),
        Arc::new(registry),
        Arc::new(TemplateSynthesizer::new()),
        &ChainSettings::default(),
    );

    let run = orchestrator
        .run(Query::new("Why is revenue down?"), CancellationToken::new(), EventSink::none())
        .await
        .unwrap();

    assert_eq!(run.plan.chain_type, ChainType::Parallel);
    assert_eq!(run.results[2].status, StepStatus::Completed);
    assert!(matches!(
        run.results[3].error,
        Some(ErrorKind::ToolNotFound { ref tool }) if tool == "get_forecast"
    ));
    assert_eq!(run.summary.completed, 3);
    assert_eq!(run.summary.failed, 1);
    assert!(run.final_answer.contains("Step 4 failed: Tool not found: get_forecast"));
}

#[tokio::test]
async fn test_invalid_llm_plan_rejected() {
    let forward_reference = r#"{"chain_type": "sequential", "steps": [
        {"step_number": 1, "question": "a", "tool_to_use": "compare_metrics", "tool_args": {"metric_a": "$step_2", "metric_b": 1}, "depends_on": [2]},
        {"step_number": 2, "question": "b", "tool_to_use": "get_revenue_data", "tool_args": {}, "depends_on": []}
    ]}"#;
    let orchestrator = ReasoningOrchestrator::new(
        Arc::new(LlmPlanner::new(Arc::new(MockLlmClient::new().reply(forward_reference)), vec![])),
        Arc::new(revenue_registry()),
        Arc::new(TemplateSynthesizer::new()),
        &ChainSettings::default(),
    );

    let err = orchestrator
        .run(Query::new("q"), CancellationToken::new(), EventSink::none())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Planning(_)));
}
