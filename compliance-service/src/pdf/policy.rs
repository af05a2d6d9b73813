//! Renders rich-text policy documents (TipTap/ProseMirror JSON) to PDF.

use serde::Deserialize;
use service_core::error::AppError;

use super::charmap::to_ascii;
use super::fonts::Font;
use super::layout::{BlockStyle, DocumentBuilder, PageLayout, Span};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mark {
    #[serde(rename = "type", default)]
    pub mark_type: String,
}

/// One node of the editor document tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RichNode {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub content: Vec<RichNode>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Doc,
    Heading,
    Paragraph,
    Text,
    HardBreak,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    Blockquote,
    HorizontalRule,
    Table,
    TableRow,
    TableCell,
    Other,
}

impl RichNode {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, AppError> {
        serde_json::from_value(value.clone())
            .map_err(|e| AppError::bad_request(format!("Invalid policy content: {}", e)))
    }

    pub fn kind(&self) -> NodeKind {
        match self.node_type.as_str() {
            "doc" => NodeKind::Doc,
            "heading" => NodeKind::Heading,
            "paragraph" => NodeKind::Paragraph,
            "text" => NodeKind::Text,
            "hardBreak" => NodeKind::HardBreak,
            "bulletList" => NodeKind::BulletList,
            "orderedList" => NodeKind::OrderedList,
            "listItem" | "taskItem" => NodeKind::ListItem,
            "codeBlock" => NodeKind::CodeBlock,
            "blockquote" => NodeKind::Blockquote,
            "horizontalRule" => NodeKind::HorizontalRule,
            "table" => NodeKind::Table,
            "tableRow" => NodeKind::TableRow,
            "tableCell" | "tableHeader" => NodeKind::TableCell,
            _ => NodeKind::Other,
        }
    }

    fn attr_i64(&self, key: &str) -> Option<i64> {
        self.attrs.get(key).and_then(serde_json::Value::as_i64)
    }

    fn has_mark(&self, mark: &str) -> bool {
        self.marks.iter().any(|m| m.mark_type == mark)
    }

    /// Concatenated raw text of this subtree.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self.kind() {
            NodeKind::Text => out.push_str(self.text.as_deref().unwrap_or_default()),
            NodeKind::HardBreak => out.push('\n'),
            _ => {
                for child in &self.content {
                    child.collect_text(out);
                }
            }
        }
    }
}

const BODY_SIZE: f32 = 10.5;
const CODE_SIZE: f32 = 9.0;
const LIST_INDENT: f32 = 16.0;
const QUOTE_INDENT: f32 = 14.0;

#[derive(Debug, Clone, Copy, Default)]
struct Context {
    indent: f32,
    quote: bool,
}

impl Context {
    fn style(&self, size: f32) -> BlockStyle {
        BlockStyle::sized(size)
            .indented(self.indent)
            .with_bar(self.quote)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyPdfRenderer {
    layout: PageLayout,
}

impl PolicyPdfRenderer {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }

    pub fn render(&self, title: &str, root: &RichNode) -> Result<Vec<u8>, AppError> {
        self.compose(title, root).finish()
    }

    fn compose(&self, title: &str, root: &RichNode) -> DocumentBuilder {
        let title = to_ascii(title);
        let mut builder = DocumentBuilder::new(self.layout).with_footer(title.clone());
        builder.heading(&title, 20.0);
        builder.rule();
        self.block(&mut builder, root, Context::default());
        builder
    }

    fn block(&self, b: &mut DocumentBuilder, node: &RichNode, ctx: Context) {
        match node.kind() {
            NodeKind::Heading => {
                let level = node.attr_i64("level").unwrap_or(1).clamp(1, 6);
                let size = match level {
                    1 => 17.0,
                    2 => 14.5,
                    3 => 12.5,
                    _ => 11.0,
                };
                b.space(size * 0.5);
                let spans: Vec<Span> = inline_spans(node)
                    .into_iter()
                    .map(|s| Span::bold(s.text))
                    .collect();
                b.paragraph(&spans, &ctx.style(size));
                b.space(size * 0.25);
            }
            NodeKind::Paragraph | NodeKind::Text => {
                b.paragraph(&inline_spans(node), &ctx.style(BODY_SIZE));
                b.space(BODY_SIZE * 0.4);
            }
            NodeKind::BulletList | NodeKind::OrderedList => {
                let ordered = node.kind() == NodeKind::OrderedList;
                let start = node.attr_i64("start").unwrap_or(1);
                for (i, item) in node.content.iter().enumerate() {
                    let marker = if ordered {
                        format!("{}.", start.saturating_add(i as i64))
                    } else {
                        "-".to_string()
                    };
                    self.list_item(b, item, &marker, ctx);
                }
                b.space(BODY_SIZE * 0.3);
            }
            NodeKind::ListItem => self.list_item(b, node, "-", ctx),
            NodeKind::CodeBlock => {
                let code = to_ascii(&node.plain_text());
                let style = ctx.style(CODE_SIZE).shaded();
                for line in code.split('\n') {
                    b.paragraph(&[Span::new(Font::Courier, line)], &style);
                }
                b.space(BODY_SIZE * 0.4);
            }
            NodeKind::Blockquote => {
                let inner = Context {
                    indent: ctx.indent + QUOTE_INDENT,
                    quote: true,
                };
                for child in &node.content {
                    self.block(b, child, inner);
                }
            }
            NodeKind::HorizontalRule => b.rule(),
            NodeKind::Table => {
                for (i, row) in node.content.iter().enumerate() {
                    let cells: Vec<String> = row
                        .content
                        .iter()
                        .map(|cell| to_ascii(cell.plain_text().trim()).replace('\n', " "))
                        .collect();
                    let font = if i == 0 || row.content.iter().any(|c| c.node_type == "tableHeader") {
                        Font::HelveticaBold
                    } else {
                        Font::Helvetica
                    };
                    b.paragraph(&[Span::new(font, cells.join(" | "))], &ctx.style(BODY_SIZE));
                }
                b.space(BODY_SIZE * 0.4);
            }
            NodeKind::HardBreak => b.space(BODY_SIZE),
            NodeKind::Doc | NodeKind::TableRow | NodeKind::TableCell | NodeKind::Other => {
                for child in &node.content {
                    self.block(b, child, ctx);
                }
            }
        }
    }

    fn list_item(&self, b: &mut DocumentBuilder, item: &RichNode, marker: &str, ctx: Context) {
        let nested = Context {
            indent: ctx.indent + LIST_INDENT,
            ..ctx
        };
        let mut marker = Some(marker.to_string());
        for child in &item.content {
            match (child.kind(), marker.take()) {
                (NodeKind::Paragraph, Some(m)) => {
                    let style = BlockStyle::sized(BODY_SIZE)
                        .indented(ctx.indent)
                        .with_bar(ctx.quote)
                        .with_marker(m);
                    b.paragraph(&inline_spans(child), &style);
                }
                (_, Some(m)) => {
                    // Item without a leading paragraph: put the marker on its own line.
                    b.paragraph(&[], &ctx.style(BODY_SIZE).with_marker(m));
                    self.block(b, child, nested);
                }
                (NodeKind::Paragraph, None) => {
                    let style = BlockStyle::sized(BODY_SIZE)
                        .indented(ctx.indent + LIST_INDENT)
                        .with_bar(ctx.quote);
                    b.paragraph(&inline_spans(child), &style);
                }
                (_, None) => self.block(b, child, nested),
            }
        }
    }
}

/// Inline content as font runs. Bold and code marks pick the font.
fn inline_spans(node: &RichNode) -> Vec<Span> {
    let mut spans = Vec::new();
    push_inline(node, &mut spans);
    spans
}

fn push_inline(node: &RichNode, spans: &mut Vec<Span>) {
    match node.kind() {
        NodeKind::Text => {
            let font = if node.has_mark("code") {
                Font::Courier
            } else if node.has_mark("bold") || node.has_mark("strong") {
                Font::HelveticaBold
            } else {
                Font::Helvetica
            };
            let text = to_ascii(node.text.as_deref().unwrap_or_default());
            spans.push(Span::new(font, text));
        }
        NodeKind::HardBreak => spans.push(Span::regular("\n")),
        _ => {
            for child in &node.content {
                push_inline(child, spans);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(content: serde_json::Value) -> RichNode {
        RichNode::from_json(&json!({ "type": "doc", "content": content })).unwrap()
    }

    #[test]
    fn renders_headings_lists_and_marks() {
        let root = doc(json!([
            { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "Scope" }] },
            { "type": "paragraph", "content": [
                { "type": "text", "text": "Applies to " },
                { "type": "text", "text": "all", "marks": [{ "type": "bold" }] },
                { "type": "text", "text": " staff\u{2014}no exceptions." }
            ]},
            { "type": "orderedList", "attrs": { "start": 3 }, "content": [
                { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "First" }] }] },
                { "type": "listItem", "content": [
                    { "type": "paragraph", "content": [{ "type": "text", "text": "Second" }] },
                    { "type": "bulletList", "content": [
                        { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Nested" }] }] }
                    ]}
                ]}
            ]}
        ]));

        let builder = PolicyPdfRenderer::default().compose("Access Policy", &root);
        let text = builder.page_text(0);
        assert_eq!(text[0], "Access Policy");
        assert!(text.contains(&"Scope"));
        assert!(text.contains(&"Applies to "));
        assert!(text.contains(&"all "));
        assert!(text.contains(&"staff--no exceptions."));
        assert!(text.contains(&"3."));
        assert!(text.contains(&"4."));
        assert!(text.contains(&"-"));
        assert!(text.contains(&"Nested"));
    }

    #[test]
    fn code_blocks_keep_lines_and_unknown_nodes_recurse() {
        let root = doc(json!([
            { "type": "codeBlock", "content": [{ "type": "text", "text": "let a = 1;\nlet b = 2;" }] },
            { "type": "callout", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Inside callout" }] }] },
            { "type": "blockquote", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Quoted" }] }] },
            { "type": "table", "content": [
                { "type": "tableRow", "content": [
                    { "type": "tableHeader", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Control" }] }] },
                    { "type": "tableHeader", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Owner" }] }] }
                ]}
            ]}
        ]));
        let builder = PolicyPdfRenderer::default().compose("Dev", &root);
        let text = builder.page_text(0);
        assert!(text.contains(&"let a = 1;"));
        assert!(text.contains(&"let b = 2;"));
        assert!(text.contains(&"Inside callout"));
        assert!(text.contains(&"Quoted"));
        assert!(text.contains(&"Control | Owner"));
    }

    #[test]
    fn long_documents_span_pages() {
        let paragraphs: Vec<_> = (0..80)
            .map(|i| json!({ "type": "paragraph", "content": [{ "type": "text", "text": format!("Clause {i}: the organisation shall review access rights quarterly and record the outcome.") }] }))
            .collect();
        let root = doc(serde_json::Value::Array(paragraphs));
        let pdf = PolicyPdfRenderer::default().render("Access Review", &root).unwrap();
        let parsed = lopdf::Document::load_mem(&pdf).unwrap();
        assert!(parsed.get_pages().len() > 1);
    }

    #[test]
    fn ordered_list_start_saturates_instead_of_overflowing() {
        let item = json!({ "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Item" }] }] });
        let root = doc(json!([
            { "type": "orderedList", "attrs": { "start": i64::MAX }, "content": [item.clone(), item] }
        ]));
        let builder = PolicyPdfRenderer::default().compose("Edge", &root);
        let max_marker = format!("{}.", i64::MAX);
        let text = builder.page_text(0);
        assert_eq!(text.iter().filter(|t| **t == max_marker).count(), 2);
    }

    #[test]
    fn rejects_malformed_content() {
        assert!(RichNode::from_json(&json!({ "type": "doc", "content": "nope" })).is_err());
    }
}
