//! 工具调用句柄
//!
//! ToolHandle 由 ToolRegistry::resolve 返回。invoke(args, timeout) 先按工具 schema 校验参数，
//! 再在超时内调用工具；失败映射为 ErrorKind（ArgumentBinding / ToolExecution / Timeout）。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::ErrorKind;
use crate::tools::Tool;

/// 已解析的工具句柄
#[derive(Clone)]
pub struct ToolHandle {
    tool: Arc<dyn Tool>,
}

impl ToolHandle {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    /// 校验参数后在 timeout 内执行；输出 JSON 审计日志
    pub async fn invoke(&self, args: Value, limit: Duration) -> Result<Value, ErrorKind> {
        let tool_name = self.tool.name().to_string();
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let validation = match args.as_object() {
            Some(map) => self.tool.schema().validate(map),
            None => Err("tool arguments must be a JSON object".to_string()),
        };
        if let Err(reason) = validation {
            audit(&tool_name, "invalid_args", start, &args_preview);
            return Err(ErrorKind::binding(format!("{tool_name}: {reason}")));
        }

        let result = timeout(limit, self.tool.execute(args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        audit(&tool_name, outcome, start, &args_preview);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ErrorKind::ToolExecution {
                tool: tool_name,
                message,
            }),
            Err(_) => Err(ErrorKind::step_timeout(limit.as_millis() as u64)),
        }
    }
}

fn audit(tool_name: &str, outcome: &str, start: Instant, args_preview: &str) {
    let duration_ms = start.elapsed().as_millis() as u64;
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool_name,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview,
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
