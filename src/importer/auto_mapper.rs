// ==========================================
// CRM 线索导入 - 自动字段映射
// ==========================================
// 规则: 按字段优先级逐个扫描列（原始顺序），首个命中即采用
// 命中: 规范化列名包含模式，或列名（≥3 字符）被模式包含
// 已知局限: 靠前字段可能抢占更适合靠后字段的列（由手动映射修正）
// ==========================================

use crate::domain::lead::{ColumnDescriptor, FieldMapping, InternalField};
use crate::importer::label_tables::normalize_label;
use crate::importer::lead_importer_trait::FieldMapper;
use tracing::debug;

/// 反向包含（列名被模式包含）要求的最短列名长度
///
/// 有意收窄反向包含: 1-2 字符的列名（如 `e`、`ID`）不参与反向匹配，
/// 否则 `e` 会命中 nombre / telefono 等几乎所有模式
const MIN_REVERSE_MATCH_CHARS: usize = 3;

/// 字段匹配模式（已规范化）
pub fn patterns(field: InternalField) -> &'static [&'static str] {
    match field {
        InternalField::Name => &["nombre", "name", "cliente", "lead", "empresa", "company"],
        InternalField::Phone => &["telefono", "phone", "tel", "celular", "movil", "whatsapp"],
        InternalField::Email => &["email", "correo", "mail"],
        InternalField::Company => &["empresa", "company", "compania", "organizacion", "negocio"],
        InternalField::Position => &["cargo", "puesto", "position", "titulo", "title"],
        InternalField::Status => &["estado", "status", "etapa", "stage"],
        InternalField::Priority => &["prioridad", "priority", "urgencia"],
        InternalField::Source => &["fuente", "source", "origen", "canal"],
        InternalField::QualificationScore => &["puntuacion", "score", "puntaje", "calificacion"],
        InternalField::ExpectedValue => &["valor", "value", "monto", "importe", "presupuesto"],
        InternalField::City => &["ciudad", "city", "localidad", "municipio"],
        InternalField::Industry => &["industria", "industry", "sector", "rubro"],
        InternalField::Website => &["sitio web", "website", "web", "url", "pagina"],
        InternalField::NextFollowUp => &["seguimiento", "follow", "proximo contacto"],
        InternalField::Notes => &["notas", "notes", "nota", "comentario", "observacion"],
    }
}

fn matches(column: &str, pattern: &str) -> bool {
    column.contains(pattern)
        || (column.chars().count() >= MIN_REVERSE_MATCH_CHARS && pattern.contains(column))
}

pub struct AutoMapper;

impl FieldMapper for AutoMapper {
    fn propose(&self, columns: &[ColumnDescriptor]) -> FieldMapping {
        let normalized: Vec<String> = columns.iter().map(|c| normalize_label(&c.name)).collect();
        let mut claimed = vec![false; columns.len()];
        let mut mapping = FieldMapping::new();

        for field in InternalField::ALL {
            let hit = (0..columns.len()).find(|&idx| {
                !claimed[idx]
                    && !normalized[idx].is_empty()
                    && patterns(field).iter().any(|p| matches(&normalized[idx], p))
            });
            if let Some(idx) = hit {
                claimed[idx] = true;
                mapping.set(field, columns[idx].name.clone());
            }
        }

        debug!(mapped = mapping.len(), columns = columns.len(), "自动映射完成");
        mapping
    }
}
