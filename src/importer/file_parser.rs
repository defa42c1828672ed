// ==========================================
// CRM 线索导入 - 文件解析器实现
// ==========================================
// 支持: CSV/文本 (csv) / Excel (.xlsx, calamine) / JSON / XML
// 红线: 解析失败即终止（fail closed），不产出半截结果
// ==========================================

use crate::domain::lead::{ColumnDescriptor, RawRecord};
use crate::domain::types::FileFormat;
use crate::importer::error::FormatError;
use crate::importer::format_detector::{decode_text, DetectedFormat};
use crate::importer::json_parser::JsonParser;
use crate::importer::lead_importer_trait::FileParser;
use crate::importer::xml_parser::XmlParser;
use calamine::{Data, Reader, Xlsx};
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::debug;

// ==========================================
// ParseOptions / ParsedFile
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// CSV 分隔符
    pub delimiter: u8,
    /// XLSX 工作表名（None = 第一个工作表）
    pub sheet_name: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            sheet_name: None,
        }
    }
}

impl ParseOptions {
    pub fn from_detected(detected: &DetectedFormat) -> Self {
        Self {
            delimiter: detected.delimiter.unwrap_or(b','),
            sheet_name: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub records: Vec<RawRecord>,
    pub columns: Vec<ColumnDescriptor>,
    /// 非致命错误（行截断、单元格错误、非对象元素等）
    pub errors: Vec<String>,
}

impl ParsedFile {
    /// 由列名与行值组装（行值按列顺序补齐）
    pub(crate) fn from_rows(
        format: FileFormat,
        names: Vec<String>,
        rows: Vec<Vec<String>>,
        errors: Vec<String>,
    ) -> Result<Self, FormatError> {
        if rows.is_empty() {
            return Err(FormatError::InsufficientRows(format));
        }
        let records: Vec<RawRecord> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, values)| {
                let mut record = RawRecord::with_capacity(idx + 1, names.len());
                let mut values = values.into_iter();
                for name in &names {
                    record.push(name.clone(), values.next().unwrap_or_default());
                }
                record
            })
            .collect();
        let columns = ColumnDescriptor::describe(&names, &records);
        Ok(Self {
            records,
            columns,
            errors,
        })
    }

    /// 由键值对记录组装（JSON/XML: 列为全部键的并集，按首次出现顺序）
    pub(crate) fn from_keyed(
        format: FileFormat,
        keyed: Vec<Vec<(String, String)>>,
        errors: Vec<String>,
    ) -> Result<Self, FormatError> {
        let mut names: Vec<String> = Vec::new();
        for pairs in &keyed {
            for (key, _) in pairs {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }
        let rows = keyed
            .into_iter()
            .map(|pairs| {
                let mut by_key: HashMap<String, String> = pairs.into_iter().collect();
                names
                    .iter()
                    .map(|n| by_key.remove(n).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self::from_rows(format, names, rows, errors)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// 表头去重: 去空白；空表头命名为 column_{n}；重复名依次加 _2, _3 …
pub fn unique_column_names<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = Vec::new();
    for (idx, header) in raw.into_iter().enumerate() {
        let base = match header.as_ref().trim() {
            "" => format!("column_{}", idx + 1),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while names.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn format(&self) -> FileFormat {
        FileFormat::Csv
    }

    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<ParsedFile, FormatError> {
        let text = decode_text(bytes);
        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let mut rows_iter = reader.records();

        // 读取表头
        let header = match rows_iter.next() {
            Some(result) => result?,
            None => return Err(FormatError::InsufficientRows(FileFormat::Csv)),
        };
        let names = unique_column_names(header.iter());

        // 读取所有行（全空单元格行保留，由转换器计为跳过）
        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for (idx, result) in rows_iter.enumerate() {
            let record = result?;
            let row_number = idx + 1;
            if record.len() > names.len() {
                errors.push(format!(
                    "第 {} 行有 {} 列，超过表头的 {} 列，多余部分已截断",
                    row_number,
                    record.len(),
                    names.len()
                ));
            }
            rows.push(
                record
                    .iter()
                    .take(names.len())
                    .map(str::to_string)
                    .collect(),
            );
        }

        debug!(rows = rows.len(), columns = names.len(), "CSV 解析完成");
        ParsedFile::from_rows(FileFormat::Csv, names, rows, errors)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn format(&self) -> FileFormat {
        FileFormat::Xlsx
    }

    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<ParsedFile, FormatError> {
        let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec()))?;

        // 选择工作表（默认第一个）
        let sheet_names = workbook.sheet_names();
        let sheet_name = match &options.sheet_name {
            Some(wanted) => sheet_names
                .iter()
                .find(|n| *n == wanted)
                .cloned()
                .ok_or_else(|| {
                    FormatError::corrupt(FileFormat::Xlsx, format!("工作表 '{}' 不存在", wanted))
                })?,
            None => sheet_names
                .first()
                .cloned()
                .ok_or_else(|| FormatError::corrupt(FileFormat::Xlsx, "Excel 文件无工作表"))?,
        };
        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let header_row = sheet_rows
            .next()
            .ok_or(FormatError::InsufficientRows(FileFormat::Xlsx))?;
        let names = unique_column_names(header_row.iter().map(|cell| cell_to_string(cell)));

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for data_row in sheet_rows {
            let row_number = rows.len() + 1;
            let values: Vec<String> = data_row
                .iter()
                .take(names.len())
                .enumerate()
                .map(|(col_idx, cell)| {
                    if let Data::Error(e) = cell {
                        errors.push(format!(
                            "第 {} 行列 '{}' 单元格错误: {:?}，按空值处理",
                            row_number, names[col_idx], e
                        ));
                    }
                    cell_to_string(cell).trim().to_string()
                })
                .collect();

            // Excel 中整行空白即物理空行
            if values.iter().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(values);
        }

        debug!(
            sheet = %sheet_name,
            rows = rows.len(),
            columns = names.len(),
            "Excel 解析完成"
        );
        ParsedFile::from_rows(FileFormat::Xlsx, names, rows, errors)
    }
}

/// 单元格转文本
///
/// - 整数值浮点数不带 `.0`
/// - 日期输出 ISO 格式（午夜时间只保留日期）
/// - 错误单元格输出空串
pub(crate) fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.time() == chrono::NaiveTime::MIN => {
                ndt.format("%Y-%m-%d").to_string()
            }
            Some(ndt) => ndt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

// ==========================================
// 通用文件解析器（根据探测结果选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parser_for(format: FileFormat) -> Box<dyn FileParser> {
        match format {
            FileFormat::Csv => Box::new(CsvParser),
            FileFormat::Xlsx => Box::new(ExcelParser),
            FileFormat::Json => Box::new(JsonParser),
            FileFormat::Xml => Box::new(XmlParser),
        }
    }

    pub fn parse(
        &self,
        bytes: &[u8],
        detected: &DetectedFormat,
        sheet_name: Option<String>,
    ) -> Result<ParsedFile, FormatError> {
        let mut options = ParseOptions::from_detected(detected);
        options.sheet_name = sheet_name;
        Self::parser_for(detected.format).parse(bytes, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semicolon() -> ParseOptions {
        ParseOptions {
            delimiter: b';',
            sheet_name: None,
        }
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let bytes = "Nombre;Telefono;Email\nJuan Perez;555-0100;juan@x.com\n;;\n";
        let parsed = CsvParser.parse(bytes.as_bytes(), &semicolon()).unwrap();

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].get("Nombre"), Some("Juan Perez"));
        assert_eq!(parsed.records[0].row_number, 1);
        assert!(parsed.records[1].is_blank());
        assert_eq!(parsed.column_names(), vec!["Nombre", "Telefono", "Email"]);
        assert_eq!(parsed.columns[2].sample, Some("juan@x.com".to_string()));
    }

    #[test]
    fn test_csv_parser_quotes_and_trim() {
        let bytes = "name,notes\n  Ana  ,\"dice \"\"hola\"\", adios\"\n";
        let parsed = CsvParser.parse(bytes.as_bytes(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.records[0].get("name"), Some("Ana"));
        assert_eq!(parsed.records[0].get("notes"), Some("dice \"hola\", adios"));
    }

    #[test]
    fn test_csv_parser_pads_and_truncates() {
        let bytes = "a,b,c\n1\n1,2,3,4\n";
        let parsed = CsvParser.parse(bytes.as_bytes(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.records[0].get("c"), Some(""));
        assert_eq!(parsed.records[1].len(), 3);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].contains("第 2 行"));
    }

    #[test]
    fn test_csv_parser_header_only_fails_closed() {
        let result = CsvParser.parse(b"Nombre;Telefono\n", &semicolon());
        assert_eq!(result.unwrap_err(), FormatError::InsufficientRows(FileFormat::Csv));
    }

    #[test]
    fn test_csv_parser_strips_bom() {
        let bytes = b"\xEF\xBB\xBFNombre,Telefono\nAna,1\n";
        let parsed = CsvParser.parse(bytes, &ParseOptions::default()).unwrap();
        assert_eq!(parsed.columns[0].name, "Nombre");
    }

    #[test]
    fn test_unique_column_names() {
        let names = unique_column_names(vec![" Email ", "", "Email", "Email", "x"]);
        assert_eq!(names, vec!["Email", "column_2", "Email_2", "Email_3", "x"]);
    }

    #[test]
    fn test_excel_parser_rejects_corrupt_bytes() {
        let result = ExcelParser.parse(b"PK\x03\x04not-really-a-zip", &ParseOptions::default());
        assert!(matches!(
            result,
            Err(FormatError::Corrupt {
                format: FileFormat::Xlsx,
                ..
            })
        ));
    }

    /// 两个工作表: "Resumen"（首个）与 "Leads"（第 2 行空白）
    fn sample_workbook() -> Vec<u8> {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let mut workbook = Workbook::new();
        {
            let summary = workbook.add_worksheet();
            summary.set_name("Resumen").unwrap();
            summary.write_string(0, 0, "Total").unwrap();
            summary.write_number(1, 0, 2.0).unwrap();
        }
        {
            let date_format = Format::new().set_num_format("yyyy-mm-dd");
            let follow_up = ExcelDateTime::from_ymd(2024, 3, 15).unwrap();
            let leads = workbook.add_worksheet();
            leads.set_name("Leads").unwrap();
            for (col, header) in ["Nombre", "Telefono", "Puntaje", "Seguimiento"]
                .iter()
                .enumerate()
            {
                leads.write_string(0, col as u16, *header).unwrap();
            }
            leads.write_string(1, 0, "Ana").unwrap();
            leads.write_string(1, 1, "555-0100").unwrap();
            leads.write_number(1, 2, 85.0).unwrap();
            leads
                .write_datetime_with_format(1, 3, &follow_up, &date_format)
                .unwrap();
            // 第 3 行（索引 2）留空
            leads.write_string(3, 0, "Luis").unwrap();
            leads.write_number(3, 1, 5550101.0).unwrap();
            leads.write_number(3, 2, 72.5).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_excel_parser_reads_selected_sheet() {
        let options = ParseOptions {
            delimiter: b',',
            sheet_name: Some("Leads".to_string()),
        };
        let parsed = ExcelParser.parse(&sample_workbook(), &options).unwrap();

        assert_eq!(
            parsed.column_names(),
            vec!["Nombre", "Telefono", "Puntaje", "Seguimiento"]
        );
        // 空白行被丢弃
        assert_eq!(parsed.records.len(), 2);

        let ana = &parsed.records[0];
        assert_eq!(ana.get("Telefono"), Some("555-0100"));
        assert_eq!(ana.get("Puntaje"), Some("85"));
        assert_eq!(ana.get("Seguimiento"), Some("2024-03-15"));

        let luis = &parsed.records[1];
        assert_eq!(luis.row_number, 2);
        assert_eq!(luis.get("Telefono"), Some("5550101"));
        assert_eq!(luis.get("Puntaje"), Some("72.5"));
        assert_eq!(luis.get("Seguimiento"), Some(""));
    }

    #[test]
    fn test_excel_parser_defaults_to_first_sheet() {
        let parsed = ExcelParser
            .parse(&sample_workbook(), &ParseOptions::default())
            .unwrap();
        assert_eq!(parsed.column_names(), vec!["Total"]);
        assert_eq!(parsed.records[0].get("Total"), Some("2"));
    }

    #[test]
    fn test_excel_parser_missing_sheet_fails() {
        let options = ParseOptions {
            delimiter: b',',
            sheet_name: Some("Clientes".to_string()),
        };
        let err = ExcelParser.parse(&sample_workbook(), &options).unwrap_err();
        assert!(err.to_string().contains("Clientes"));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Float(5550100.0)), "5550100");
        assert_eq!(cell_to_string(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_from_keyed_fills_missing_cells() {
        let parsed = ParsedFile::from_keyed(
            FileFormat::Json,
            vec![
                vec![("a".to_string(), "1".to_string())],
                vec![
                    ("b".to_string(), "2".to_string()),
                    ("a".to_string(), "3".to_string()),
                ],
            ],
            Vec::new(),
        )
        .unwrap();

        assert_eq!(parsed.column_names(), vec!["a", "b"]);
        assert_eq!(parsed.records[0].get("b"), Some(""));
        let order: Vec<&str> = parsed.records[1].columns().collect();
        assert_eq!(order, vec!["a", "b"]);
    }
}
