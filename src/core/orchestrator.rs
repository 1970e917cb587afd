//! 推理编排器：规划 → 校验 → 执行 → 综合
//!
//! 每次查询创建一个 ChainRun 值并沿调用栈显式传递，编排器本身无每请求可变状态，可被多个请求共享。
//! 只有执行前的 PlanningError（及规划阶段被取消）会以 Err 逃逸；整链超时 / 取消产出 Aborted 的 ChainRun。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::chain::events::{ChainEvent, EventSink};
use crate::chain::executor::{ChainExecutor, ExecutionLimits};
use crate::chain::step::StepExecutor;
use crate::chain::types::{ChainRun, ChainStatus, Query};
use crate::config::{AppConfig, ChainSettings};
use crate::core::dto::{ReasoningRequest, ReasoningResponse};
use crate::core::ChainError;
use crate::llm::create_llm_client;
use crate::planning::{validate_plan, LlmPlanner, Planner};
use crate::synthesis::{LlmSynthesizer, SynthesisInput, Synthesizer, TemplateSynthesizer};
use crate::tools::{register_builtin, register_fixtures, ToolRegistry};

pub struct ReasoningOrchestrator {
    planner: Arc<dyn Planner>,
    steps: StepExecutor,
    synthesizer: Arc<dyn Synthesizer>,
    limits: ExecutionLimits,
    max_steps: usize,
    max_query_chars: usize,
}

impl ReasoningOrchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        registry: Arc<ToolRegistry>,
        synthesizer: Arc<dyn Synthesizer>,
        settings: &ChainSettings,
    ) -> Self {
        Self {
            planner,
            steps: StepExecutor::new(registry),
            synthesizer,
            limits: ExecutionLimits::from(settings),
            max_steps: settings.max_steps,
            max_query_chars: settings.max_query_chars,
        }
    }

    /// 覆盖执行限制（毫秒级整链超时等）
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// 按配置组装：内置分析工具 + 配置声明的数据工具、LLM 规划器、模板或 LLM 综合器
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ChainError> {
        cfg.chain.validate()?;

        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry);
        register_fixtures(&mut registry, &cfg.tools);
        tracing::info!(tools = ?registry.tool_names(), "tool registry ready");

        let llm = create_llm_client(&cfg.llm)?;
        let planner = LlmPlanner::new(llm.clone(), registry.tool_descriptions())
            .with_fallback_tool(cfg.planner.fallback_tool.clone());

        let synthesizer: Arc<dyn Synthesizer> = if cfg.synthesis.use_llm {
            Arc::new(LlmSynthesizer::new(llm))
        } else {
            Arc::new(TemplateSynthesizer::new())
        };

        Ok(Self::new(
            Arc::new(planner),
            Arc::new(registry),
            synthesizer,
            &cfg.chain,
        ))
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.steps.registry()
    }

    fn check_query(&self, query: &Query) -> Result<(), ChainError> {
        if query.text.trim().is_empty() {
            return Err(ChainError::Planning("query text is empty".to_string()));
        }
        let chars = query.text.chars().count();
        if chars > self.max_query_chars {
            return Err(ChainError::Planning(format!(
                "query is {chars} characters, limit is {}",
                self.max_query_chars
            )));
        }
        Ok(())
    }

    /// 运行一次完整推理链
    pub async fn run(
        &self,
        query: Query,
        cancel: CancellationToken,
        events: EventSink,
    ) -> Result<ChainRun, ChainError> {
        let id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("chain", %id);
        self.run_chain(id, query, cancel, events).instrument(span).await
    }

    async fn run_chain(
        &self,
        id: String,
        query: Query,
        cancel: CancellationToken,
        events: EventSink,
    ) -> Result<ChainRun, ChainError> {
        let started_at = chrono::Utc::now().timestamp_millis();
        self.check_query(&query)?;

        let mut status = ChainStatus::Planning;
        tracing::debug!(?status, query = %query.text, "planning");
        let plan = tokio::select! {
            _ = cancel.cancelled() => return Err(ChainError::Cancelled),
            plan = self.planner.plan(&query) => plan?,
        };
        if let Err(e) = validate_plan(&plan, self.max_steps) {
            tracing::warn!(error = %e, "plan rejected");
            return Err(e);
        }
        tracing::info!(chain_type = %plan.chain_type, steps = plan.steps.len(), "chain planned");
        events.emit(ChainEvent::Planned {
            chain_type: plan.chain_type,
            steps: plan.steps.len(),
        });

        status = ChainStatus::Executing;
        tracing::debug!(?status, "executing");
        let outcome = ChainExecutor::new(self.steps.clone(), self.limits)
            .with_events(events)
            .run(&plan, cancel)
            .await;

        status = ChainStatus::Synthesizing;
        tracing::debug!(?status, "synthesizing");
        let synthesis = self
            .synthesizer
            .synthesize(SynthesisInput {
                query: &query,
                plan: &plan,
                results: &outcome.results,
                issues: &outcome.issues,
                abort: outcome.abort.as_ref(),
                elapsed_ms: outcome.elapsed_ms,
            })
            .await;

        status = if outcome.abort.is_some() {
            ChainStatus::Aborted
        } else {
            ChainStatus::Done
        };
        tracing::info!(
            ?status,
            completed = synthesis.summary.completed,
            failed = synthesis.summary.failed,
            skipped = synthesis.summary.skipped,
            total_time_ms = synthesis.summary.total_time_ms,
            "chain finished"
        );

        Ok(ChainRun {
            id,
            query,
            plan,
            results: outcome.results,
            summary: synthesis.summary,
            final_answer: synthesis.final_answer,
            status,
            issues: outcome.issues,
            abort_reason: outcome.abort.map(|e| e.to_string()),
            started_at,
        })
    }

    /// 请求边界：调用方总会得到响应
    pub async fn handle(&self, request: ReasoningRequest, cancel: CancellationToken) -> ReasoningResponse {
        match self.run(request.into_query(), cancel, EventSink::none()).await {
            Ok(run) => ReasoningResponse::from_run(&run),
            Err(e) => {
                tracing::warn!(error = %e, "reasoning request failed before execution");
                ReasoningResponse::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{ChainPlan, ChainType};
    use crate::planning::StaticPlanner;

    fn orchestrator(plan: ChainPlan) -> ReasoningOrchestrator {
        ReasoningOrchestrator::new(
            Arc::new(StaticPlanner::new(plan)),
            Arc::new(ToolRegistry::new()),
            Arc::new(TemplateSynthesizer::new()),
            &ChainSettings::default(),
        )
    }

    fn empty_plan() -> ChainPlan {
        ChainPlan {
            chain_type: ChainType::Sequential,
            reasoning: None,
            steps: vec![],
        }
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let err = orchestrator(empty_plan())
            .run(Query::new("   "), CancellationToken::new(), EventSink::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Planning(_)));
    }

    #[tokio::test]
    async fn test_invalid_plan_rejected_before_execution() {
        let response = orchestrator(empty_plan())
            .handle(
                ReasoningRequest {
                    query: "Why?".into(),
                    context: None,
                    mode: Default::default(),
                },
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(response, ReasoningResponse::Failure(_)));
    }

    #[test]
    fn test_from_config_defaults() {
        let orchestrator = ReasoningOrchestrator::from_config(&AppConfig::default()).unwrap();
        assert!(orchestrator.registry().contains("compare_metrics"));
    }
}
