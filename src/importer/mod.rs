// ==========================================
// CRM 线索导入 - 导入层
// ==========================================
// 职责: 外部文件 → 有序行记录 → 字段映射 → 线索候选
// 支持: CSV / Excel (.xlsx) / JSON / XML
// ==========================================

// 模块声明
pub mod auto_mapper;
pub mod data_cleaner;
pub mod error;
pub mod file_parser;
pub mod format_detector;
pub mod json_parser;
pub mod label_tables;
pub mod lead_importer_trait;
pub mod mapping_validator;
pub mod record_transformer;
pub mod template;
pub mod xml_parser;

// 重导出核心类型
pub use auto_mapper::AutoMapper;
pub use data_cleaner::DataCleaner as DataCleanerImpl;
pub use error::{FormatError, ImportError, PipelineResult};
pub use file_parser::{CsvParser, ExcelParser, ParseOptions, ParsedFile, UniversalFileParser};
pub use format_detector::{DetectedFormat, FormatDetector};
pub use json_parser::JsonParser;
pub use label_tables::LabeledEnum;
pub use mapping_validator::{MappingIssue, ValidatedMapping};
pub use record_transformer::{RecordTransformer, RowOutcome, TransformedRow};
pub use template::generate_template;
pub use xml_parser::XmlParser;

// 重导出 Trait 接口
pub use lead_importer_trait::{DataCleaner, FieldMapper, FileParser};
