//! 链执行器
//!
//! 按 chain_type 调度步骤：
//! - **Sequential**：按步骤号顺序逐个执行
//! - **Parallel**：依赖图入度调度，就绪队列 FIFO，并发数受 max_parallel 约束
//! - **Conditional**：顺序执行，条件步骤进入终态后立即求值并跳过落选分支
//!
//! 执行器是 StepResult 表的唯一写入者；派生的步骤任务只拿到依赖结果的快照，完成后把结果交还给执行器。
//! 整链截止时间或取消令牌触发时：Running 步骤记为 Failed（Timeout chain 或 Cancelled，附实际耗时），Pending 步骤记为 Skipped。

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::chain::binder::PriorResults;
use crate::chain::events::{ChainEvent, EventSink};
use crate::chain::graph::DependencyGraph;
use crate::chain::step::StepExecutor;
use crate::chain::types::*;
use crate::config::ChainSettings;
use crate::core::{ChainError, ErrorKind};

/// 执行限制
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub step_timeout: Duration,
    pub chain_timeout: Duration,
    pub max_parallel: usize,
}

impl From<&ChainSettings> for ExecutionLimits {
    fn from(settings: &ChainSettings) -> Self {
        Self {
            step_timeout: settings.step_timeout(),
            chain_timeout: settings.chain_timeout(),
            max_parallel: settings.max_parallel_steps,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from(&ChainSettings::default())
    }
}

/// 一次链执行的产出
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// 与 plan.steps 同序，全部处于终态
    pub results: Vec<StepResult>,
    pub issues: Vec<ErrorKind>,
    pub elapsed_ms: u64,
    /// 整链超时或取消
    pub abort: Option<ChainError>,
}

impl ChainOutcome {
    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_results(&self.results, self.elapsed_ms)
    }
}

/// 执行期状态表
struct RunState {
    results: Vec<StepResult>,
    index: HashMap<StepNumber, usize>,
    /// 进入 Running 的时刻，中止时用于记录实际耗时
    started: HashMap<StepNumber, Instant>,
    issues: Vec<ErrorKind>,
    events: EventSink,
}

impl RunState {
    fn new(plan: &ChainPlan, events: EventSink) -> Self {
        let results: Vec<StepResult> = plan
            .steps
            .iter()
            .map(|s| StepResult::pending(s.step_number))
            .collect();
        let index = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_number, i))
            .collect();
        Self {
            results,
            index,
            started: HashMap::new(),
            issues: Vec::new(),
            events,
        }
    }

    fn get(&self, step: StepNumber) -> Option<&StepResult> {
        self.index.get(&step).map(|i| &self.results[*i])
    }

    fn get_mut(&mut self, step: StepNumber) -> Option<&mut StepResult> {
        match self.index.get(&step) {
            Some(i) => Some(&mut self.results[*i]),
            None => None,
        }
    }

    fn is_terminal(&self, step: StepNumber) -> bool {
        self.get(step).is_some_and(|r| r.status.is_terminal())
    }

    /// 依赖是否全部 Completed；否则返回跳过原因
    fn check_dependencies(&self, spec: &StepSpec) -> Result<(), String> {
        for dep in spec.depends_on.iter().chain(spec.referenced_steps().iter()) {
            match self.get(*dep) {
                Some(r) if r.is_completed() => {}
                Some(r) => return Err(format!("dependency step {dep} {}", r.status)),
                None => return Err(format!("dependency step {dep} does not exist")),
            }
        }
        Ok(())
    }

    /// 依赖结果快照
    fn prior_for(&self, spec: &StepSpec) -> PriorResults {
        spec.depends_on
            .iter()
            .chain(spec.referenced_steps().iter())
            .filter_map(|dep| self.get(*dep).map(|r| (*dep, r.clone())))
            .collect()
    }

    fn start(&mut self, spec: &StepSpec) -> bool {
        let started = self
            .get_mut(spec.step_number)
            .is_some_and(|r| r.transition(StepStatus::Running));
        if started {
            self.started.insert(spec.step_number, Instant::now());
            self.events.emit(ChainEvent::StepStarted {
                step: spec.step_number,
                tool: spec.tool_name.clone(),
            });
        }
        started
    }

    /// 记录派生任务交还的终态结果；只接受自身表中处于 Running 的步骤
    fn record(&mut self, outcome: StepResult) {
        let step = outcome.step_number;
        let Some(owned) = self.get_mut(step) else {
            tracing::warn!(step, "result for unknown step dropped");
            return;
        };
        let elapsed = outcome.execution_time_ms.unwrap_or_default();
        let accepted = match outcome.status {
            StepStatus::Completed => owned.complete(
                outcome.result.unwrap_or_default(),
                outcome.conclusion.unwrap_or_default(),
                elapsed,
            ),
            StepStatus::Failed => owned.fail(
                outcome
                    .error
                    .unwrap_or_else(|| ErrorKind::binding("step failed without error")),
                elapsed,
            ),
            other => {
                tracing::warn!(step, status = %other, "non-terminal step outcome dropped");
                false
            }
        };
        if accepted {
            let status = owned.status;
            self.events.emit(ChainEvent::StepFinished {
                step,
                status,
                elapsed_ms: Some(elapsed),
            });
        }
    }

    fn skip(&mut self, step: StepNumber, reason: String) {
        let skipped = self.get_mut(step).is_some_and(|r| r.skip(reason.clone()));
        if skipped {
            tracing::debug!(step, %reason, "step skipped");
            self.events.emit(ChainEvent::StepSkipped { step, reason });
        }
    }

    /// 中止：Running → Failed(err)，Pending → Skipped
    fn abort(&mut self, error: &ErrorKind, reason: &str) {
        let mut finished = Vec::new();
        let mut skipped = Vec::new();
        for r in &mut self.results {
            match r.status {
                StepStatus::Running => {
                    let elapsed_ms = self
                        .started
                        .get(&r.step_number)
                        .map(|t| t.elapsed().as_millis() as u64)
                        .unwrap_or_default();
                    r.fail(error.clone(), elapsed_ms);
                    finished.push(r.step_number);
                }
                StepStatus::Pending => {
                    r.skip(reason);
                    skipped.push(r.step_number);
                }
                _ => {}
            }
        }
        for step in finished {
            let elapsed_ms = self.get(step).and_then(|r| r.execution_time_ms);
            self.events.emit(ChainEvent::StepFinished {
                step,
                status: StepStatus::Failed,
                elapsed_ms,
            });
        }
        for step in skipped {
            self.events.emit(ChainEvent::StepSkipped {
                step,
                reason: reason.to_string(),
            });
        }
    }
}

/// 链执行器
pub struct ChainExecutor {
    steps: StepExecutor,
    limits: ExecutionLimits,
    events: EventSink,
}

impl ChainExecutor {
    pub fn new(steps: StepExecutor, limits: ExecutionLimits) -> Self {
        Self {
            steps,
            limits,
            events: EventSink::none(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// 执行整条链；超时或取消不返回错误，而是体现在 ChainOutcome.abort
    pub async fn run(&self, plan: &ChainPlan, cancel: CancellationToken) -> ChainOutcome {
        let start = Instant::now();
        let mut state = RunState::new(plan, self.events.clone());

        tracing::info!(
            chain_type = %plan.chain_type,
            steps = plan.steps.len(),
            "chain execution started"
        );

        let abort = {
            let work = async {
                match plan.chain_type {
                    ChainType::Sequential => self.run_sequential(plan, &mut state).await,
                    ChainType::Parallel => self.run_parallel(plan, &mut state).await,
                    ChainType::Conditional => self.run_conditional(plan, &mut state).await,
                }
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(ChainError::Cancelled),
                _ = work => None,
                _ = tokio::time::sleep(self.limits.chain_timeout) => {
                    Some(ChainError::ChainTimeout {
                        after_ms: self.limits.chain_timeout.as_millis() as u64,
                    })
                }
            }
        };

        if let Some(err) = &abort {
            tracing::warn!(error = %err, "chain aborted");
            let after_ms = start.elapsed().as_millis() as u64;
            let kind = match err {
                ChainError::Cancelled => ErrorKind::Cancelled { after_ms },
                _ => ErrorKind::chain_timeout(after_ms),
            };
            state.abort(&kind, &err.to_string());
            state.issues.push(kind);
            self.events.emit(ChainEvent::ChainAborted {
                reason: err.to_string(),
            });
        } else {
            // 依赖成环等非法计划会遗留非终态步骤
            state.abort(
                &ErrorKind::binding("step never became runnable"),
                "step never became runnable",
            );
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let outcome = ChainOutcome {
            results: state.results,
            issues: state.issues,
            elapsed_ms,
            abort,
        };
        let summary = outcome.summary();
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms,
            "chain execution finished"
        );
        outcome
    }

    /// 在当前任务内执行单步；工具 panic 记为 Failed
    async fn run_inline(&self, spec: &StepSpec, state: &mut RunState) {
        if !state.start(spec) {
            return;
        }
        let prior = state.prior_for(spec);
        let outcome = guarded(self.steps.clone(), spec.clone(), prior, self.limits.step_timeout).await;
        state.record(outcome);
    }

    async fn run_sequential(&self, plan: &ChainPlan, state: &mut RunState) {
        for spec in ordered(plan) {
            if let Err(reason) = state.check_dependencies(spec) {
                state.skip(spec.step_number, reason);
                continue;
            }
            self.run_inline(spec, state).await;
        }
    }

    async fn run_conditional(&self, plan: &ChainPlan, state: &mut RunState) {
        for spec in ordered(plan) {
            if !state.is_terminal(spec.step_number) {
                match state.check_dependencies(spec) {
                    Ok(()) => self.run_inline(spec, state).await,
                    Err(reason) => state.skip(spec.step_number, reason),
                }
            }
            for branch in plan.branches().filter(|b| b.predicate_on == spec.step_number) {
                self.resolve_branch(branch, state);
            }
        }
    }

    fn resolve_branch(&self, branch: &BranchSpec, state: &mut RunState) {
        let Some(source) = state.get(branch.predicate_on) else {
            return;
        };

        if source.is_completed() {
            let result = source.result.clone().unwrap_or_default();
            let taken = branch.predicate.evaluate(&result);
            tracing::info!(predicate_on = branch.predicate_on, taken, "branch resolved");
            state.events.emit(ChainEvent::BranchResolved {
                predicate_on: branch.predicate_on,
                taken,
            });
            let losing = if taken { &branch.on_false } else { &branch.on_true };
            for step in losing {
                state.skip(
                    *step,
                    format!("branch on step {} not taken", branch.predicate_on),
                );
            }
        } else {
            let status = source.status;
            tracing::warn!(predicate_on = branch.predicate_on, %status, "condition unresolved");
            state.issues.push(ErrorKind::ConditionUnresolved {
                predicate_on: branch.predicate_on,
                status: status.to_string(),
            });
            state.events.emit(ChainEvent::ConditionUnresolved {
                predicate_on: branch.predicate_on,
            });
            for step in branch.on_true.iter().chain(branch.on_false.iter()) {
                state.skip(
                    *step,
                    format!("condition on step {} unresolved", branch.predicate_on),
                );
            }
        }
    }

    async fn run_parallel(&self, plan: &ChainPlan, state: &mut RunState) {
        let specs: HashMap<StepNumber, &StepSpec> =
            plan.steps.iter().map(|s| (s.step_number, s)).collect();
        let mut graph = DependencyGraph::new(plan);
        let mut ready: VecDeque<StepNumber> = graph.roots().into();
        let mut running: JoinSet<StepResult> = JoinSet::new();
        let max_parallel = self.limits.max_parallel.max(1);

        loop {
            while running.len() < max_parallel {
                let Some(step) = ready.pop_front() else {
                    break;
                };
                let Some(spec) = specs.get(&step).copied() else {
                    continue;
                };
                if let Err(reason) = state.check_dependencies(spec) {
                    state.skip(step, reason);
                    ready.extend(graph.resolve(step));
                    continue;
                }
                if !state.start(spec) {
                    continue;
                }
                let prior = state.prior_for(spec);
                running.spawn(guarded(
                    self.steps.clone(),
                    spec.clone(),
                    prior,
                    self.limits.step_timeout,
                ));
            }

            match running.join_next().await {
                Some(Ok(outcome)) => {
                    let step = outcome.step_number;
                    state.record(outcome);
                    ready.extend(graph.resolve(step));
                }
                Some(Err(err)) => {
                    tracing::error!(error = %err, "step task did not complete");
                }
                None => break,
            }
        }
    }
}

/// 步骤号升序
fn ordered(plan: &ChainPlan) -> Vec<&StepSpec> {
    let mut steps: Vec<&StepSpec> = plan.steps.iter().collect();
    steps.sort_by_key(|s| s.step_number);
    steps
}

async fn guarded(
    executor: StepExecutor,
    spec: StepSpec,
    prior: PriorResults,
    timeout: Duration,
) -> StepResult {
    let start = Instant::now();
    match AssertUnwindSafe(executor.execute(&spec, &prior, timeout))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(step = spec.step_number, tool = %spec.tool_name, "tool panicked");
            let mut result = StepResult::pending(spec.step_number);
            result.transition(StepStatus::Running);
            result.fail(
                ErrorKind::ToolExecution {
                    tool: spec.tool_name.clone(),
                    message: "tool panicked".to_string(),
                },
                start.elapsed().as_millis() as u64,
            );
            result
        }
    }
}
