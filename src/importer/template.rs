// ==========================================
// CRM 线索导入 - 导入模板生成
// ==========================================
// 职责: 按内部字段顺序生成带表头的 CSV / JSON / XML 模板
// 限制: 不生成 XLSX 模板
// ==========================================

use crate::domain::lead::InternalField;
use crate::domain::types::FileFormat;
use crate::importer::error::{ImportError, PipelineResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::{Map, Value};
use std::io::Cursor;

/// 示例行
fn example_value(field: InternalField) -> &'static str {
    match field {
        InternalField::Name => "Juan Perez",
        InternalField::Phone => "555-0100",
        InternalField::Email => "juan@ejemplo.com",
        InternalField::Company => "Acme S.A.",
        InternalField::Position => "Gerente de Compras",
        InternalField::Status => "Nuevo",
        InternalField::Priority => "Media",
        InternalField::Source => "Sitio web",
        InternalField::QualificationScore => "80",
        InternalField::ExpectedValue => "1500",
        InternalField::City => "Madrid",
        InternalField::Industry => "Tecnologia",
        InternalField::Website => "https://acme.example",
        InternalField::NextFollowUp => "2024-12-01",
        InternalField::Notes => "",
    }
}

/// XML 标签名（表头中的空格替换为下划线）
fn xml_tag(field: InternalField) -> String {
    field.template_header().replace(' ', "_")
}

fn template_error(err: impl std::fmt::Display) -> ImportError {
    ImportError::Template(err.to_string())
}

/// 生成导入模板
///
/// # 参数
/// - format: 模板格式（xlsx 不支持）
/// - with_example: 是否附带一行示例数据
pub fn generate_template(format: FileFormat, with_example: bool) -> PipelineResult<Vec<u8>> {
    let value_of = |field: InternalField| {
        if with_example {
            example_value(field)
        } else {
            ""
        }
    };

    match format {
        FileFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record(InternalField::ALL.iter().map(|f| f.template_header()))
                .map_err(template_error)?;
            if with_example {
                writer
                    .write_record(InternalField::ALL.iter().map(|f| value_of(*f)))
                    .map_err(template_error)?;
            }
            writer.into_inner().map_err(template_error)
        }
        FileFormat::Json => {
            let record: Map<String, Value> = InternalField::ALL
                .iter()
                .map(|f| (f.template_header().to_string(), Value::from(value_of(*f))))
                .collect();
            let mut root = Map::new();
            root.insert("leads".to_string(), Value::Array(vec![Value::Object(record)]));
            serde_json::to_vec_pretty(&Value::Object(root)).map_err(template_error)
        }
        FileFormat::Xml => {
            let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(template_error)?;
            writer
                .write_event(Event::Start(BytesStart::new("leads")))
                .map_err(template_error)?;
            writer
                .write_event(Event::Start(BytesStart::new("lead")))
                .map_err(template_error)?;
            for field in InternalField::ALL {
                let tag = xml_tag(field);
                writer
                    .write_event(Event::Start(BytesStart::new(tag.as_str())))
                    .map_err(template_error)?;
                writer
                    .write_event(Event::Text(BytesText::new(value_of(field))))
                    .map_err(template_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new(tag.as_str())))
                    .map_err(template_error)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("lead")))
                .map_err(template_error)?;
            writer
                .write_event(Event::End(BytesEnd::new("leads")))
                .map_err(template_error)?;
            Ok(writer.into_inner().into_inner())
        }
        FileFormat::Xlsx => Err(ImportError::Template(
            "不支持生成 xlsx 模板，请使用 csv/json/xml".to_string(),
        )),
    }
}

/// 模板文件名
pub fn template_file_name(format: FileFormat) -> String {
    format!("plantilla_leads.{}", format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_template_header_order() {
        let bytes = generate_template(FileFormat::Csv, false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("Nombre,Telefono,Email,Empresa"));
        assert!(header.ends_with("Proximo Seguimiento,Notas"));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_json_template_preserves_field_order() {
        let bytes = generate_template(FileFormat::Json, true).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let record = value["leads"][0].as_object().unwrap();
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys[0], "Nombre");
        assert_eq!(keys[14], "Notas");
        assert_eq!(record["Telefono"], "555-0100");
    }

    #[test]
    fn test_xml_template_uses_valid_tags() {
        let bytes = generate_template(FileFormat::Xml, false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<Valor_Esperado>"));
        assert!(text.contains("<Proximo_Seguimiento>"));
        assert!(text.starts_with("<?xml"));
    }

    #[test]
    fn test_xlsx_template_unsupported() {
        assert!(matches!(
            generate_template(FileFormat::Xlsx, false),
            Err(ImportError::Template(_))
        ));
    }
}
