//! 推理链过程事件：用于流式展示与测试插桩（观察步骤启动 / 结束顺序）

use serde::Serialize;
use tokio::sync::mpsc;

use crate::chain::types::{ChainType, StepNumber, StepStatus};

/// 链执行事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    /// 规划完成
    Planned { chain_type: ChainType, steps: usize },
    /// 步骤进入 Running
    StepStarted { step: StepNumber, tool: String },
    /// 步骤进入 Completed / Failed
    StepFinished {
        step: StepNumber,
        status: StepStatus,
        elapsed_ms: Option<u64>,
    },
    /// 步骤被跳过
    StepSkipped { step: StepNumber, reason: String },
    /// 分支已求值
    BranchResolved { predicate_on: StepNumber, taken: bool },
    /// 条件步骤未完成，两侧分支均跳过
    ConditionUnresolved { predicate_on: StepNumber },
    /// 整链中止（超时 / 取消）
    ChainAborted { reason: String },
}

/// 事件发送端；未订阅时为空操作
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ChainEvent>>,
}

impl EventSink {
    pub fn none() -> Self {
        Self::default()
    }

    /// 创建发送端与接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ChainEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
