// ==========================================
// CRM 线索导入 - 数据清洗器实现
// ==========================================
// 职责: TRIM / 空白折叠 / NULL 标准化 / 区域数值解析 / 日期解析 / 范围校验
// ==========================================

use crate::importer::lead_importer_trait::DataCleaner as DataCleanerTrait;
use chrono::{NaiveDate, NaiveDateTime};

/// 可接受的日期格式（按顺序尝试）
pub const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y%m%d", "%Y/%m/%d"];

/// 数值中直接剔除的字符（货币符号与空白类）
const STRIPPED_NUMERIC_CHARS: [char; 6] = ['$', '€', '£', '¥', '\'', '\u{a0}'];

pub struct DataCleaner;

impl DataCleanerTrait for DataCleaner {
    fn clean_text(&self, value: &str, collapse_whitespace: bool) -> String {
        if collapse_whitespace {
            value.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            value.trim().to_string()
        }
    }

    fn normalize_null(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn parse_decimal(&self, value: &str) -> Option<f64> {
        let cleaned: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && !STRIPPED_NUMERIC_CHARS.contains(c))
            .collect();
        if cleaned.is_empty()
            || !cleaned
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        {
            return None;
        }

        let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
            // 两者都出现: 靠后的为小数点
            (Some(dot), Some(comma)) => {
                if dot > comma {
                    cleaned.replace(',', "")
                } else {
                    cleaned.replace('.', "").replace(',', ".")
                }
            }
            // 只有逗号: 单个为小数点，多个为千分位
            (None, Some(_)) => {
                if cleaned.matches(',').count() == 1 {
                    cleaned.replace(',', ".")
                } else {
                    cleaned.replace(',', "")
                }
            }
            // 只有点: 多个为千分位
            (Some(_), None) => {
                if cleaned.matches('.').count() > 1 {
                    cleaned.replace('.', "")
                } else {
                    cleaned
                }
            }
            (None, None) => cleaned,
        };

        normalized.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
            .or_else(|| {
                // Excel 日期时间单元格
                NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.date())
            })
    }

    fn validate_range(&self, value: f64, min: f64, max: f64) -> Option<f64> {
        if value < min || value > max {
            None
        } else {
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.clean_text("  Juan   Perez \t", true), "Juan Perez");
        assert_eq!(cleaner.clean_text("  a  b ", false), "a  b");
    }

    #[test]
    fn test_normalize_null() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.normalize_null(Some("  ")), None);
        assert_eq!(cleaner.normalize_null(None), None);
        assert_eq!(cleaner.normalize_null(Some(" x ")), Some("x".to_string()));
    }

    #[test]
    fn test_parse_decimal_locales() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_decimal("1234,56"), Some(1234.56));
        assert_eq!(cleaner.parse_decimal("1.234,56"), Some(1234.56));
        assert_eq!(cleaner.parse_decimal("1,234.56"), Some(1234.56));
        assert_eq!(cleaner.parse_decimal("1.234.567"), Some(1234567.0));
        assert_eq!(cleaner.parse_decimal("1,234,567"), Some(1234567.0));
        assert_eq!(cleaner.parse_decimal("$ 1 200"), Some(1200.0));
        assert_eq!(cleaner.parse_decimal("€75.5"), Some(75.5));
        assert_eq!(cleaner.parse_decimal("-3"), Some(-3.0));
    }

    #[test]
    fn test_parse_decimal_rejects_text() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_decimal(""), None);
        assert_eq!(cleaner.parse_decimal("alto"), None);
        assert_eq!(cleaner.parse_decimal("12abc"), None);
        assert_eq!(cleaner.parse_decimal("1-2"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let cleaner = DataCleaner;
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(cleaner.parse_date("2024-03-15"), expected);
        assert_eq!(cleaner.parse_date("15/03/2024"), expected);
        assert_eq!(cleaner.parse_date("15-03-2024"), expected);
        assert_eq!(cleaner.parse_date("20240315"), expected);
        assert_eq!(cleaner.parse_date("2024/03/15"), expected);
        assert_eq!(cleaner.parse_date("2024-03-15 09:30:00"), expected);
        assert_eq!(cleaner.parse_date("mañana"), None);
    }

    #[test]
    fn test_validate_range() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.validate_range(50.0, 0.0, 100.0), Some(50.0));
        assert_eq!(cleaner.validate_range(101.0, 0.0, 100.0), None);
        assert_eq!(cleaner.validate_range(-1.0, 0.0, f64::MAX), None);
    }
}
