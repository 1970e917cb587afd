//! 工具参数 Schema：声明参数名 / 类型 / 是否必填，调用前校验
//!
//! 校验失败时由 ToolHandle 转为 ArgumentBinding 错误，底层工具不会收到畸形参数。

use serde::Serialize;
use serde_json::{json, Map, Value};

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// 任意 JSON（常用于接收前序步骤的整块结果）
    Any,
}

impl ArgType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Number => value.is_number(),
            ArgType::Boolean => value.is_boolean(),
            ArgType::Object => value.is_object(),
            ArgType::Array => value.is_array(),
            ArgType::Any => true,
        }
    }

    fn json_type(self) -> Option<&'static str> {
        match self {
            ArgType::String => Some("string"),
            ArgType::Number => Some("number"),
            ArgType::Boolean => Some("boolean"),
            ArgType::Object => Some("object"),
            ArgType::Array => Some("array"),
            ArgType::Any => None,
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgType,
    pub required: bool,
}

/// 工具参数 Schema；默认不限制参数
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolSchema {
    pub args: Vec<ArgSpec>,
    /// 是否拒绝未声明的参数
    pub strict: bool,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: ArgType) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: ArgType) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// 校验参数存在性与类型；可选参数为 null 视为未提供
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for spec in &self.args {
            match args.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(format!("missing required argument '{}'", spec.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(format!(
                        "argument '{}' expected {:?}, got {}",
                        spec.name,
                        spec.kind,
                        describe(value)
                    ));
                }
                Some(_) => {}
            }
        }

        if self.strict {
            if let Some(extra) = args
                .keys()
                .find(|k| !self.args.iter().any(|spec| &spec.name == *k))
            {
                return Err(format!("unexpected argument '{extra}'"));
            }
        }
        Ok(())
    }

    /// JSON Schema 形式（写入规划 prompt 供 LLM 生成正确参数）
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|spec| {
                let prop = match spec.kind.json_type() {
                    Some(t) => json!({ "type": t }),
                    None => json!({}),
                };
                (spec.name.clone(), prop)
            })
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|s| s.required)
            .map(|s| s.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
