//! 模板综合器：确定性输出，仅依赖步骤结果内容（按步骤号排序），不含耗时等易变信息
//!
//! full：结论 + 关键发现 + 置信度说明 + 建议行动；compact：结论 + 关键发现

use async_trait::async_trait;
use serde_json::Value;

use crate::chain::types::{ResponseMode, StepResult, StepStatus};
use crate::core::ErrorKind;
use crate::synthesis::{Synthesis, SynthesisInput, Synthesizer};

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSynthesizer;

impl TemplateSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// 组合最终答案（同步，供 LLM 综合器回退使用）
    pub fn compose(&self, input: &SynthesisInput<'_>) -> String {
        let sorted = input.sorted_results();
        let completed: Vec<&StepResult> = sorted.iter().copied().filter(|r| r.is_completed()).collect();

        let mut sections = vec![headline(input, &sorted, &completed)];

        if !completed.is_empty() {
            let findings = completed
                .iter()
                .filter_map(|r| r.conclusion.as_deref())
                .map(|c| format!("- {c}"))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Key findings:\n{findings}"));
        }

        if input.query.mode == ResponseMode::Full {
            if let Some(note) = confidence_note(&sorted, input.issues) {
                sections.push(note);
            }
            sections.push(recommended_actions(&sorted));
        }

        sections.join("\n\n")
    }
}

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    async fn synthesize(&self, input: SynthesisInput<'_>) -> Synthesis {
        Synthesis {
            final_answer: self.compose(&input),
            summary: input.summary(),
        }
    }
}

/// 首个阻塞错误：步骤错误 > 链级问题 > 跳过原因
fn first_blocker(sorted: &[&StepResult], issues: &[ErrorKind]) -> String {
    sorted
        .iter()
        .find_map(|r| r.error.as_ref())
        .or_else(|| issues.first())
        .map(ToString::to_string)
        .or_else(|| sorted.iter().find_map(|r| r.skip_reason.clone()))
        .unwrap_or_else(|| "no step completed".to_string())
}

/// 去掉 "Step N: " 前缀
fn finding_text(conclusion: &str) -> &str {
    conclusion
        .split_once(": ")
        .map(|(_, rest)| rest)
        .unwrap_or(conclusion)
}

fn headline(input: &SynthesisInput<'_>, sorted: &[&StepResult], completed: &[&StepResult]) -> String {
    let query = &input.query.text;
    let cut_short = input
        .abort
        .map(|e| format!(" Analysis was cut short: {e}."))
        .unwrap_or_default();

    let Some(last) = completed.last() else {
        return format!(
            "The question \"{query}\" could not be answered: {}.{cut_short}",
            first_blocker(sorted, input.issues)
        );
    };

    let finding = last.conclusion.as_deref().map(finding_text).unwrap_or("no conclusion");
    format!(
        "Answer to \"{query}\" ({} of {} steps completed): {finding}.{cut_short}",
        completed.len(),
        sorted.len()
    )
}

fn confidence_note(sorted: &[&StepResult], issues: &[ErrorKind]) -> Option<String> {
    let mut lines: Vec<String> = sorted
        .iter()
        .filter_map(|r| match r.status {
            StepStatus::Failed => Some(format!(
                "- Step {} failed: {}",
                r.step_number,
                r.error.as_ref().map(ToString::to_string).unwrap_or_default()
            )),
            StepStatus::Skipped => Some(format!(
                "- Step {} skipped: {}",
                r.step_number,
                r.skip_reason.as_deref().unwrap_or("not run")
            )),
            _ => None,
        })
        .collect();
    lines.extend(issues.iter().map(|i| format!("- {i}")));

    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Confidence: reduced, these findings are missing or incomplete:\n{}",
        lines.join("\n")
    ))
}

fn recommended_actions(sorted: &[&StepResult]) -> String {
    let mut actions = Vec::new();

    for r in sorted.iter().filter(|r| r.is_completed()) {
        let Some(Value::Object(out)) = &r.result else {
            continue;
        };
        let text = |k: &str| out.get(k).and_then(Value::as_str);
        if text("magnitude") == Some("significant") {
            if let Some(direction) = text("direction") {
                actions.push(format!(
                    "- Investigate the significant {direction} found in step {}.",
                    r.step_number
                ));
            }
        }
        if text("trend") == Some("decreasing") {
            actions.push(format!(
                "- Address the decreasing trend found in step {}.",
                r.step_number
            ));
        }
    }

    let failed: Vec<String> = sorted
        .iter()
        .filter(|r| r.status == StepStatus::Failed)
        .map(|r| r.step_number.to_string())
        .collect();
    if !failed.is_empty() {
        actions.push(format!(
            "- Re-run the analysis once step(s) {} can complete.",
            failed.join(", ")
        ));
    }

    if actions.is_empty() {
        actions.push("- No immediate action required.".to_string());
    }
    format!("Recommended actions:\n{}", actions.join("\n"))
}
