//! 参数绑定：把 StepSpec.tool_args 中的占位符解析为前序步骤的真实输出
//!
//! 只允许消费状态为 Completed 的步骤；被引用步骤 Failed / Skipped / 尚未执行时返回 ArgumentBinding。

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::chain::types::{lookup_field, ArgValue, StepNumber, StepResult};
use crate::core::ErrorKind;

/// 前序步骤结果快照（步骤号 -> 结果）
pub type PriorResults = HashMap<StepNumber, StepResult>;

/// 解析参数；字面量原样透传
pub fn bind(
    tool_args: &BTreeMap<String, ArgValue>,
    prior: &PriorResults,
) -> Result<Map<String, Value>, ErrorKind> {
    let mut resolved = Map::new();
    for (name, arg) in tool_args {
        let value = match arg {
            ArgValue::Literal(v) => v.clone(),
            ArgValue::Reference { step, field } => resolve_reference(name, *step, field.as_deref(), prior)?,
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}

fn resolve_reference(
    arg_name: &str,
    step: StepNumber,
    field: Option<&str>,
    prior: &PriorResults,
) -> Result<Value, ErrorKind> {
    let source = prior.get(&step).ok_or_else(|| {
        ErrorKind::binding(format!("argument '{arg_name}' references unknown step {step}"))
    })?;

    if !source.is_completed() {
        return Err(ErrorKind::binding(format!(
            "argument '{arg_name}' references step {step}, which is {}",
            source.status
        )));
    }

    let result = source.result.as_ref().ok_or_else(|| {
        ErrorKind::binding(format!("step {step} completed without a result"))
    })?;

    match field {
        None => Ok(result.clone()),
        Some(path) => lookup_field(result, path).cloned().ok_or_else(|| {
            ErrorKind::binding(format!(
                "argument '{arg_name}': step {step} result has no field '{path}'"
            ))
        }),
    }
}
