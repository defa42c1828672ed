// ==========================================
// CRM 线索导入 - 标签对照表
// ==========================================
// 职责: 文本标签 ↔ 封闭枚举（状态 / 优先级 / 来源）
// 匹配: 规范化后精确匹配（小写、去重音、下划线视为空格、折叠空白）
// ==========================================

use crate::domain::types::{LeadPriority, LeadSource, LeadStatus};

/// 规范化标签: 小写 + 西语重音折叠 + `_` 视为空格 + 折叠空白
pub fn normalize_label(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            '_' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ==========================================
// LabeledEnum - 带标签的封闭枚举
// ==========================================
pub trait LabeledEnum: Copy + Default + 'static {
    fn variants() -> &'static [Self];

    /// 内部编码
    fn code(&self) -> &'static str;

    /// 展示标签
    fn display_label(&self) -> &'static str;

    /// 额外别名（已规范化）
    fn aliases(&self) -> &'static [&'static str];

    /// 文本 → 枚举；空白或未匹配返回 None
    fn resolve(raw: &str) -> Option<Self> {
        let key = normalize_label(raw);
        if key.is_empty() {
            return None;
        }
        Self::variants().iter().copied().find(|variant| {
            normalize_label(variant.code()) == key
                || normalize_label(variant.display_label()) == key
                || variant.aliases().contains(&key.as_str())
        })
    }
}

impl LabeledEnum for LeadStatus {
    fn variants() -> &'static [Self] {
        &LeadStatus::ALL
    }

    fn code(&self) -> &'static str {
        self.as_str()
    }

    fn display_label(&self) -> &'static str {
        self.label()
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            LeadStatus::New => &["nueva", "nuevo lead", "sin contactar", "open"],
            LeadStatus::Contacted => &["contactada", "en contacto", "llamado"],
            LeadStatus::Qualified => &["calificada", "cualificado", "cualificada", "interesado"],
            LeadStatus::Proposal => &["propuesta enviada", "cotizacion", "cotizado", "quote"],
            LeadStatus::Negotiation => &["en negociacion", "negociando"],
            LeadStatus::Won => &[
                "ganado",
                "ganada",
                "cerrado",
                "cerrada",
                "cerrado ganado",
                "closed won",
                "cliente",
            ],
            LeadStatus::Lost => &["perdida", "cerrado perdido", "closed lost", "descartado"],
        }
    }
}

impl LabeledEnum for LeadPriority {
    fn variants() -> &'static [Self] {
        &LeadPriority::ALL
    }

    fn code(&self) -> &'static str {
        self.as_str()
    }

    fn display_label(&self) -> &'static str {
        self.label()
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            LeadPriority::Low => &["bajo"],
            LeadPriority::Medium => &["medio", "normal"],
            LeadPriority::High => &["alto"],
            LeadPriority::Urgent => &["critica", "critico", "muy alta"],
        }
    }
}

impl LabeledEnum for LeadSource {
    fn variants() -> &'static [Self] {
        &LeadSource::ALL
    }

    fn code(&self) -> &'static str {
        self.as_str()
    }

    fn display_label(&self) -> &'static str {
        self.label()
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            LeadSource::Website => &["web", "pagina web", "sitio", "landing", "formulario web"],
            LeadSource::Referral => &["referida", "recomendacion", "referencia"],
            LeadSource::SocialMedia => &["redes", "facebook", "instagram", "linkedin", "social"],
            LeadSource::Email => &["correo", "e-mail", "mail", "email marketing"],
            LeadSource::ColdCall => &["llamada", "llamada en frio", "telefono", "cold call"],
            LeadSource::Event => &["feria", "expo", "conferencia"],
            LeadSource::Advertising => &["anuncio", "ads", "campana", "google ads"],
            LeadSource::Other => &["otra", "otros"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Negociación  "), "negociacion");
        assert_eq!(normalize_label("SOCIAL_MEDIA"), "social media");
        assert_eq!(normalize_label("Llamada   en Frío"), "llamada en frio");
    }

    #[test]
    fn test_resolve_status_by_code_label_and_alias() {
        assert_eq!(LeadStatus::resolve("won"), Some(LeadStatus::Won));
        assert_eq!(LeadStatus::resolve("Ganado / Cerrado"), Some(LeadStatus::Won));
        assert_eq!(LeadStatus::resolve("ganado / cerrado"), Some(LeadStatus::Won));
        assert_eq!(LeadStatus::resolve("NEGOCIACIÓN"), Some(LeadStatus::Negotiation));
        assert_eq!(LeadStatus::resolve("cerrado"), Some(LeadStatus::Won));
        assert_eq!(LeadStatus::resolve("quizás"), None);
        assert_eq!(LeadStatus::resolve("  "), None);
    }

    #[test]
    fn test_resolve_priority_and_source() {
        assert_eq!(LeadPriority::resolve("Alta"), Some(LeadPriority::High));
        assert_eq!(LeadPriority::resolve("urgent"), Some(LeadPriority::Urgent));
        assert_eq!(LeadSource::resolve("Redes sociales"), Some(LeadSource::SocialMedia));
        assert_eq!(LeadSource::resolve("social_media"), Some(LeadSource::SocialMedia));
        assert_eq!(LeadSource::resolve("Correo electrónico"), Some(LeadSource::Email));
        assert_eq!(LeadSource::resolve("cold call"), Some(LeadSource::ColdCall));
    }

    #[test]
    fn test_every_label_round_trips() {
        for status in LeadStatus::ALL {
            assert_eq!(LeadStatus::resolve(status.label()), Some(status));
        }
        for priority in LeadPriority::ALL {
            assert_eq!(LeadPriority::resolve(priority.label()), Some(priority));
        }
        for source in LeadSource::ALL {
            assert_eq!(LeadSource::resolve(source.label()), Some(source));
        }
    }
}
