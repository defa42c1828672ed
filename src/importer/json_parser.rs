// ==========================================
// CRM 线索导入 - JSON 解析器
// ==========================================
// 记录来源: 顶层数组 / 顶层对象中首个对象数组 / 顶层对象本身
// 扁平化: contact.email / items.0.name / 标量数组以 ", " 连接
// ==========================================

use crate::domain::types::FileFormat;
use crate::importer::error::FormatError;
use crate::importer::file_parser::{ParseOptions, ParsedFile};
use crate::importer::format_detector::decode_text;
use crate::importer::lead_importer_trait::FileParser;
use serde_json::Value;
use tracing::debug;

pub struct JsonParser;

impl FileParser for JsonParser {
    fn format(&self) -> FileFormat {
        FileFormat::Json
    }

    fn parse(&self, bytes: &[u8], _options: &ParseOptions) -> Result<ParsedFile, FormatError> {
        let text = decode_text(bytes);
        let root: Value = serde_json::from_str(&text)?;

        let elements: Vec<&Value> = match &root {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => match map.values().find(|v| is_record_array(v)) {
                Some(Value::Array(items)) => items.iter().collect(),
                _ => vec![&root],
            },
            _ => {
                return Err(FormatError::corrupt(
                    FileFormat::Json,
                    "顶层必须是数组或对象",
                ))
            }
        };

        let mut keyed = Vec::with_capacity(elements.len());
        let mut errors = Vec::new();
        for (idx, element) in elements.into_iter().enumerate() {
            if !element.is_object() {
                errors.push(format!("第 {} 个元素不是对象，已忽略", idx + 1));
                continue;
            }
            let mut pairs = Vec::new();
            flatten("", element, &mut pairs);
            keyed.push(pairs);
        }

        debug!(records = keyed.len(), ignored = errors.len(), "JSON 解析完成");
        ParsedFile::from_keyed(FileFormat::Json, keyed, errors)
    }
}

/// 非空且首元素为对象的数组
fn is_record_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.first().map_or(false, Value::is_object))
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// 递归扁平化为 (路径, 文本) 序列，保持键顺序
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            if map.is_empty() && !prefix.is_empty() {
                out.push((prefix.to_string(), String::new()));
            }
            for (key, child) in map {
                flatten(&join_key(prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            let nested = items.iter().any(|i| i.is_object() || i.is_array());
            if nested {
                for (idx, item) in items.iter().enumerate() {
                    flatten(&join_key(prefix, &idx.to_string()), item, out);
                }
            } else {
                let joined: Vec<String> = items
                    .iter()
                    .map(scalar_to_string)
                    .filter(|s| !s.is_empty())
                    .collect();
                out.push((prefix.to_string(), joined.join(", ")));
            }
        }
        scalar => out.push((prefix.to_string(), scalar_to_string(scalar))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParsedFile, FormatError> {
        JsonParser.parse(text.as_bytes(), &ParseOptions::default())
    }

    #[test]
    fn test_top_level_array_with_nested_objects() {
        let parsed = parse(
            r#"[
                {"nombre": "Ana", "contact": {"phone": "555", "email": null}, "tags": ["vip", "2024"]},
                {"nombre": "Luis", "score": 80, "active": true}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            parsed.column_names(),
            vec!["nombre", "contact.phone", "contact.email", "tags", "score", "active"]
        );
        assert_eq!(parsed.records[0].get("contact.phone"), Some("555"));
        assert_eq!(parsed.records[0].get("contact.email"), Some(""));
        assert_eq!(parsed.records[0].get("tags"), Some("vip, 2024"));
        assert_eq!(parsed.records[1].get("score"), Some("80"));
        assert_eq!(parsed.records[1].get("active"), Some("true"));
        assert_eq!(parsed.records[1].get("contact.phone"), Some(""));
    }

    #[test]
    fn test_object_with_record_array() {
        let parsed = parse(r#"{"meta": {"v": 1}, "leads": [{"name": "Ana"}, {"name": "Eva"}]}"#)
            .unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].get("name"), Some("Eva"));
    }

    #[test]
    fn test_single_object_is_one_record() {
        let parsed = parse(r#"{"name": "Ana", "phone": "1"}"#).unwrap();
        assert_eq!(parsed.records.len(), 1);
    }

    #[test]
    fn test_array_of_objects_flattens_with_index() {
        let parsed = parse(r#"[{"items": [{"name": "a"}, {"name": "b"}]}]"#).unwrap();
        assert_eq!(parsed.records[0].get("items.0.name"), Some("a"));
        assert_eq!(parsed.records[0].get("items.1.name"), Some("b"));
    }

    #[test]
    fn test_non_object_elements_reported() {
        let parsed = parse(r#"[{"name": "Ana"}, 42, "x"]"#).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.errors.len(), 2);
    }

    #[test]
    fn test_empty_and_invalid_fail_closed() {
        assert_eq!(
            parse("[]").unwrap_err(),
            FormatError::InsufficientRows(FileFormat::Json)
        );
        assert!(matches!(
            parse("[{\"a\": 1"),
            Err(FormatError::Corrupt {
                format: FileFormat::Json,
                ..
            })
        ));
        assert!(parse("42").is_err());
    }
}
