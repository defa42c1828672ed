// ==========================================
// CRM 线索导入 - XML 解析器
// ==========================================
// 流程: quick-xml 事件流 → 元素树 → 定位记录容器 → 记录扁平化
// 容器: 自根向下，只要当前节点仅有一个子元素且该子元素下还有非叶子节点就继续下降
// 记录: 容器中出现次数最多的子元素标签（并列取先出现者）
//       仅有属性的空元素重复出现时同样逐个成为记录
// 键名: 记录属性 @attr / 嵌套属性 path.@attr / 叶子文本 path / 重复兄弟 tag_2
// ==========================================

use crate::domain::types::FileFormat;
use crate::importer::error::FormatError;
use crate::importer::file_parser::{ParseOptions, ParsedFile};
use crate::importer::format_detector::decode_text;
use crate::importer::lead_importer_trait::FileParser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::debug;

/// 元素树节点
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

pub struct XmlParser;

impl FileParser for XmlParser {
    fn format(&self) -> FileFormat {
        FileFormat::Xml
    }

    fn parse(&self, bytes: &[u8], _options: &ParseOptions) -> Result<ParsedFile, FormatError> {
        let text = decode_text(bytes);
        let root = build_tree(&text)?;
        let container = find_container(&root);

        let keyed: Vec<Vec<(String, String)>> = match record_tag(container) {
            Some(tag) => container
                .children
                .iter()
                .filter(|c| c.name == tag)
                .map(flatten_record)
                .collect(),
            // 容器本身即单条记录
            None => vec![flatten_record(container)],
        };

        debug!(
            container = %container.name,
            records = keyed.len(),
            "XML 解析完成"
        );
        ParsedFile::from_keyed(FileFormat::Xml, keyed, Vec::new())
    }
}

fn start_node(e: &BytesStart<'_>) -> Result<XmlNode, FormatError> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FormatError::corrupt(FileFormat::Xml, err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.trim().to_string();
        node.attributes.push((key, value));
    }
    Ok(node)
}

/// 事件流 → 元素树
fn build_tree(text: &str) -> Result<XmlNode, FormatError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => {
                if root.is_none() {
                    *root = Some(node);
                }
            }
        }
    }

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                attach(&mut stack, &mut root, node);
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(FormatError::corrupt(FileFormat::Xml, "元素未闭合"));
    }
    root.ok_or_else(|| FormatError::corrupt(FileFormat::Xml, "文档没有根元素"))
}

fn find_container(root: &XmlNode) -> &XmlNode {
    let mut node = root;
    while node.children.len() == 1 && node.children[0].children.iter().any(|g| !g.is_leaf()) {
        node = &node.children[0];
    }
    node
}

/// 记录标签；None 表示容器本身即单条记录
///
/// - 有非叶子子元素: 取出现次数最多的标签
/// - 全部为叶子: 仅当该标签重复出现且带属性时逐个成为记录
fn record_tag(container: &XmlNode) -> Option<&str> {
    let (tag, count) = dominant_tag(container)?;
    let matching: Vec<&XmlNode> = container.children.iter().filter(|c| c.name == tag).collect();
    if matching.iter().any(|c| !c.is_leaf()) {
        return Some(tag);
    }
    if count > 1 && matching.iter().all(|c| !c.attributes.is_empty()) {
        return Some(tag);
    }
    None
}

/// 出现次数最多的子元素标签及其次数
fn dominant_tag(container: &XmlNode) -> Option<(&str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for child in &container.children {
        match counts.iter_mut().find(|(name, _)| *name == child.name) {
            Some((_, count)) => *count += 1,
            None => counts.push((child.name.as_str(), 1)),
        }
    }
    // 并列时保留先出现者
    let mut best: Option<(&str, usize)> = None;
    for (name, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    best
}

fn flatten_record(record: &XmlNode) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in &record.attributes {
        out.push((format!("@{}", key), value.clone()));
    }
    if record.is_leaf() {
        if !record.text.trim().is_empty() {
            out.push((record.name.clone(), record.text.trim().to_string()));
        }
    } else {
        flatten_children("", &record.children, &mut out);
    }
    out
}

fn flatten_children(prefix: &str, children: &[XmlNode], out: &mut Vec<(String, String)>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for child in children {
        let count = seen.entry(child.name.as_str()).or_insert(0);
        *count += 1;
        let segment = if *count == 1 {
            child.name.clone()
        } else {
            format!("{}_{}", child.name, count)
        };
        let path = if prefix.is_empty() {
            segment
        } else {
            format!("{}.{}", prefix, segment)
        };

        for (key, value) in &child.attributes {
            out.push((format!("{}.@{}", path, key), value.clone()));
        }
        if child.is_leaf() {
            out.push((path, child.text.trim().to_string()));
        } else {
            flatten_children(&path, &child.children, out);
        }
    }
}
