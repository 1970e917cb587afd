//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 按顺序返回预置回复，用尽后返回默认回复；记录收到的最后一条 User 消息便于断言提示词内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<String, String>>>,
    default: Option<Result<String, String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功回复
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()))
    }

    /// 追加一条失败回复
    pub fn fail(self, error: impl Into<String>) -> Self {
        self.push(Err(error.into()))
    }

    /// 预置回复用尽后的默认回复
    pub fn with_default(mut self, response: Result<String, String>) -> Self {
        self.default = Some(response);
        self
    }

    fn push(self, response: Result<String, String>) -> Self {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(response);
        }
        self
    }

    /// 已收到的 User 消息（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(last_user);
        }

        let next = self.scripted.lock().ok().and_then(|mut q| q.pop_front());
        match next.or_else(|| self.default.clone()) {
            Some(response) => response,
            None => Err("mock llm has no scripted response".to_string()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
