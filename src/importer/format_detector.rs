// ==========================================
// CRM 线索导入 - 文件格式探测器
// ==========================================
// 职责: 扩展名优先 + 内容嗅探 → {csv, xlsx, json, xml}
// 附带: CSV 分隔符判定（, 与 ;）/ BOM 剥离 / 告警收集
// ==========================================

use crate::domain::types::FileFormat;
use crate::importer::error::FormatError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use tracing::debug;

/// UTF-8 BOM
pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// ZIP 本地文件头（xlsx 为 ZIP 容器）
pub const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// 二进制内容判定扫描长度
const BINARY_SCAN_BYTES: usize = 1024;

// ==========================================
// DetectedFormat - 探测结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFormat {
    pub format: FileFormat,
    /// 仅 CSV 有效
    pub delimiter: Option<u8>,
    pub bom_stripped: bool,
    pub warnings: Vec<String>,
}

// ==========================================
// FormatDetector
// ==========================================
pub struct FormatDetector {
    max_file_bytes: usize,
}

impl FormatDetector {
    pub fn new(max_file_bytes: usize) -> Self {
        Self { max_file_bytes }
    }

    /// 识别文件格式
    ///
    /// # 参数
    /// - file_name: 上传时声明的文件名
    /// - bytes: 文件内容
    ///
    /// # 返回
    /// - Ok(DetectedFormat): 格式 + 分隔符 + 告警
    /// - Err(FormatError): 空文件 / 超过大小上限 / 不支持的格式
    pub fn detect(&self, file_name: &str, bytes: &[u8]) -> Result<DetectedFormat, FormatError> {
        if bytes.len() > self.max_file_bytes {
            return Err(FormatError::TooLarge {
                size: bytes.len(),
                limit: self.max_file_bytes,
            });
        }

        let (content, bom_stripped) = strip_bom(bytes);
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(FormatError::EmptyFile(file_name.to_string()));
        }

        let mut warnings = Vec::new();
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let sniffed = sniff(content);

        let format = match extension.as_deref().and_then(FileFormat::from_extension) {
            Some(by_ext) => {
                if sniffed != by_ext && (sniffed == FileFormat::Xlsx || by_ext == FileFormat::Xlsx)
                {
                    warnings.push(format!(
                        "扩展名为 .{}，但内容看起来是 {}；按扩展名处理",
                        by_ext, sniffed
                    ));
                }
                by_ext
            }
            None => {
                match extension.as_deref() {
                    None | Some("txt") => {}
                    Some(other) => {
                        if sniffed == FileFormat::Csv && looks_binary(content) {
                            return Err(FormatError::Unsupported(format!(".{}", other)));
                        }
                        warnings.push(format!(
                            "无法识别的扩展名 .{}，按内容识别为 {}",
                            other, sniffed
                        ));
                    }
                }
                if extension.is_none() && sniffed == FileFormat::Csv && looks_binary(content) {
                    return Err(FormatError::Unsupported(file_name.to_string()));
                }
                sniffed
            }
        };

        let textual = format != FileFormat::Xlsx;
        if bom_stripped && textual {
            warnings.push("已移除文件开头的 UTF-8 BOM".to_string());
        }
        if textual && std::str::from_utf8(content).is_err() {
            warnings.push("文件不是有效的 UTF-8 编码，无法解码的字符已被替换".to_string());
        }

        let delimiter = if format == FileFormat::Csv {
            let text = String::from_utf8_lossy(content);
            let first_line = text.lines().next().unwrap_or("");
            let (delimiter, warning) = detect_delimiter(first_line);
            warnings.extend(warning);
            Some(delimiter)
        } else {
            None
        };

        debug!(
            file_name = %file_name,
            format = %format,
            delimiter = ?delimiter.map(char::from),
            warnings = warnings.len(),
            "文件格式识别完成"
        );

        Ok(DetectedFormat {
            format,
            delimiter,
            bom_stripped: bom_stripped && textual,
            warnings,
        })
    }
}

/// 剥离 UTF-8 BOM
pub fn strip_bom(bytes: &[u8]) -> (&[u8], bool) {
    match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    }
}

/// 文本解码（去 BOM，非法 UTF-8 以替换字符解码）
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(strip_bom(bytes).0)
}

/// 内容嗅探（无法识别的文本一律视为分隔文本）
fn sniff(content: &[u8]) -> FileFormat {
    if content.starts_with(ZIP_SIGNATURE) {
        return FileFormat::Xlsx;
    }
    let start = content
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(content.len());
    match content.get(start) {
        Some(b'{') | Some(b'[') => FileFormat::Json,
        Some(b'<') => FileFormat::Xml,
        _ => FileFormat::Csv,
    }
}

fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SCAN_BYTES).any(|b| *b == 0)
}

/// 判定 CSV 分隔符
///
/// # 规则
/// - 统计首行引号外的 `,` 与 `;` 个数，多者胜出；相等时默认 `,`
/// - 两者均出现且接近（差值 ≤ 1 或较少者 ≥ 较多者的 80%）时给出告警
pub fn detect_delimiter(first_line: &str) -> (u8, Option<String>) {
    let mut commas = 0usize;
    let mut semicolons = 0usize;
    let mut in_quotes = false;
    for ch in first_line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            _ => {}
        }
    }

    let delimiter = if semicolons > commas { b';' } else { b',' };

    let (min, max) = if commas < semicolons {
        (commas, semicolons)
    } else {
        (semicolons, commas)
    };
    let near_tie = min > 0 && (max - min <= 1 || min * 5 >= max * 4);
    let warning = near_tie.then(|| {
        format!(
            "分隔符判定接近（逗号 {} 个，分号 {} 个），已选择 '{}'",
            commas,
            semicolons,
            char::from(delimiter)
        )
    });

    (delimiter, warning)
}
