//! 工具参数 JSON Schema 生成（schemars 自动生成）
//!
//! 每个工具用一个带 `#[derive(Deserialize, JsonSchema)]` 的参数结构体声明参数；启动时生成
//! `{type: "object", properties, required}`，执行时用同一结构体做类型化解析。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::AgentError;

/// 发送给模型的工具描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// OpenAI function-calling 包装：{"type": "function", "function": {...}}
    pub fn to_function_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": self,
        })
    }
}

/// 空参数 schema
pub fn empty_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 由参数结构体生成 parameters schema：内联子结构、去掉 $schema 与 title，保证 properties / required 存在
pub fn args_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(&root.schema).unwrap_or_else(|_| empty_parameters());

    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.entry("type").or_insert_with(|| json!("object"));
        obj.entry("properties").or_insert_with(|| json!({}));
        obj.entry("required").or_insert_with(|| json!([]));
    }
    value
}

/// 把 JSON 参数解析为类型化结构体；失败统一为 InvalidArguments
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, AgentError> {
    serde_json::from_value(args).map_err(|e| AgentError::invalid_arguments(tool, e))
}
