//! 工具参数 JSON Schema 生成（schemars）
//!
//! 子 schema 全部内联、不带 $schema / title / definitions，Option 字段不加 null 类型，
//! 三家厂商的函数声明都能直接接受。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

/// 由参数结构体生成工具的 parameters schema
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
            s.option_add_null_type = false;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();

    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| {
        serde_json::json!({"type": "object", "properties": {}})
    });
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
        map.remove("title");
        map.remove("definitions");
        map.entry("required").or_insert_with(|| Value::Array(Vec::new()));
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Args {
        #[schemars(description = "What to do")]
        what: String,
        when: Option<String>,
    }

    #[test]
    fn test_schema_shape() {
        let s = parameters_schema_for::<Args>();
        assert_eq!(s["type"], "object");
        assert_eq!(s["properties"]["what"]["description"], "What to do");
        assert_eq!(s["properties"]["when"]["type"], "string");
        assert_eq!(s["required"], serde_json::json!(["what"]));
        assert!(s.get("title").is_none());
        assert!(s.get("$schema").is_none());
    }
}
