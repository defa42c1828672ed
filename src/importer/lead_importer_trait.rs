// ==========================================
// CRM 线索导入 - 导入管道 Trait
// ==========================================
// 职责: 定义解析 / 映射 / 清洗接口（不包含实现）
// ==========================================

use crate::domain::lead::{ColumnDescriptor, FieldMapping};
use crate::domain::types::FileFormat;
use crate::importer::error::FormatError;
use crate::importer::file_parser::{ParseOptions, ParsedFile};
use chrono::NaiveDate;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口
// 实现者: CsvParser, ExcelParser, JsonParser, XmlParser
pub trait FileParser: Send + Sync {
    /// 本解析器处理的格式
    fn format(&self) -> FileFormat;

    /// 解析文件内容为有序行记录 + 列描述
    ///
    /// # 参数
    /// - bytes: 文件内容（文本格式可带 BOM）
    /// - options: 分隔符 / 工作表名
    ///
    /// # 返回
    /// - Ok(ParsedFile): 行记录、列描述、非致命错误
    /// - Err(FormatError): 内容损坏或数据不足
    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<ParsedFile, FormatError>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 自动映射接口
// 实现者: AutoMapper
pub trait FieldMapper: Send + Sync {
    /// 根据列名推荐字段映射（可能不完整）
    fn propose(&self, columns: &[ColumnDescriptor]) -> FieldMapping;
}

// ==========================================
// DataCleaner Trait
// ==========================================
// 用途: 单元格清洗接口
// 实现者: DataCleanerImpl
pub trait DataCleaner: Send + Sync {
    /// 清洗文本字段（TRIM，可选折叠内部空白）
    fn clean_text(&self, value: &str, collapse_whitespace: bool) -> String;

    /// 标准化 NULL 值（空字符串/空白 → None）
    fn normalize_null(&self, value: Option<&str>) -> Option<String>;

    /// 解析数值（兼容 1.234,56 / 1,234.56 / 1234,56 / $ 1 200）
    ///
    /// # 返回
    /// - Some(f64): 解析成功
    /// - None: 非数值
    fn parse_decimal(&self, value: &str) -> Option<f64>;

    /// 解析日期（多种常见格式）
    fn parse_date(&self, value: &str) -> Option<NaiveDate>;

    /// 校验数值范围（闭区间）
    fn validate_range(&self, value: f64, min: f64, max: f64) -> Option<f64>;
}
