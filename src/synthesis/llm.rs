//! LLM 综合器：以原始问题与已完成步骤的结果 / 结论为上下文生成答案；任何失败回退到模板

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::types::ResponseMode;
use crate::llm::{LlmClient, Message};
use crate::synthesis::{Synthesis, SynthesisInput, Synthesizer, TemplateSynthesizer};

pub struct LlmSynthesizer {
    llm: Arc<dyn LlmClient>,
    fallback: TemplateSynthesizer,
}

impl LlmSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback: TemplateSynthesizer::new(),
        }
    }
}

pub fn synthesis_prompt(input: &SynthesisInput<'_>) -> String {
    let steps = input
        .sorted_results()
        .into_iter()
        .filter(|r| r.is_completed())
        .map(|r| {
            let question = input
                .plan
                .step(r.step_number)
                .map(|s| s.question.as_str())
                .unwrap_or_default();
            let result = r
                .result
                .as_ref()
                .and_then(|v| serde_json::to_string_pretty(v).ok())
                .unwrap_or_default();
            format!(
                "Step {}: {question}\nResult: {result}\nConclusion: {}",
                r.step_number,
                r.conclusion.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let format = match input.query.mode {
        ResponseMode::Full => {
            "- Direct answer to the question (2-3 sentences)\n- Key findings (bullet points)\n- Which findings are missing and how that affects confidence\n- Recommended actions (if applicable)"
        }
        ResponseMode::Compact => "- Direct answer to the question (2-3 sentences)\n- Key findings (bullet points)",
    };

    format!(
        r#"You are a business analyst synthesizing the results of a multi-step analysis.

ORIGINAL QUESTION: "{query}"

REASONING STEPS COMPLETED ({completed} of {total}):
{steps}

OUTPUT FORMAT:
{format}

Be concise but thorough. Use the actual data from the steps."#,
        query = input.query.text,
        completed = input.summary().completed,
        total = input.results.len(),
    )
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(&self, input: SynthesisInput<'_>) -> Synthesis {
        let summary = input.summary();

        // 无完成步骤时 LLM 没有可用材料
        if summary.completed == 0 {
            return self.fallback.synthesize(input).await;
        }

        let messages = vec![Message::user(synthesis_prompt(&input))];
        match self.llm.complete(&messages).await {
            Ok(answer) if !answer.trim().is_empty() => Synthesis {
                final_answer: answer.trim().to_string(),
                summary,
            },
            Ok(_) => {
                tracing::warn!("empty synthesis reply, using template");
                self.fallback.synthesize(input).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, using template");
                self.fallback.synthesize(input).await
            }
        }
    }
}
