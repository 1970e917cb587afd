//! 综合层：把全部步骤结果组合为最终答案与执行汇总
//!
//! 综合永不失败：没有任何步骤完成时，给出无法回答的说明并指出首个阻塞错误。

pub mod llm;
pub mod template;

use async_trait::async_trait;

use crate::chain::types::{ChainPlan, ExecutionSummary, Query, StepResult};
use crate::core::{ChainError, ErrorKind};

pub use llm::LlmSynthesizer;
pub use template::TemplateSynthesizer;

/// 综合输入（全部为只读快照）
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub query: &'a Query,
    pub plan: &'a ChainPlan,
    /// 与 plan.steps 同序
    pub results: &'a [StepResult],
    pub issues: &'a [ErrorKind],
    pub abort: Option<&'a ChainError>,
    pub elapsed_ms: u64,
}

impl SynthesisInput<'_> {
    /// 按步骤号排序的结果，保证输出与完成顺序无关
    pub fn sorted_results(&self) -> Vec<&StepResult> {
        let mut sorted: Vec<&StepResult> = self.results.iter().collect();
        sorted.sort_by_key(|r| r.step_number);
        sorted
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_results(self.results, self.elapsed_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub final_answer: String,
    pub summary: ExecutionSummary,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, input: SynthesisInput<'_>) -> Synthesis;
}
