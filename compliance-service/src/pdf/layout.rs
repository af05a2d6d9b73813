//! Line-oriented page composition on top of `lopdf`.
//!
//! [`DocumentBuilder`] keeps a vertical cursor, wraps text against measured
//! glyph widths and starts a new page when the next line would cross the
//! bottom margin. Drawing commands are buffered per page and only encoded in
//! [`DocumentBuilder::finish`], which lets the footer carry a page total.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use service_core::error::AppError;

use super::fonts::{text_width, Font};
use super::pdf_error;

#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
}

impl PageLayout {
    pub const A4: PageLayout = PageLayout {
        width: 595.0,
        height: 842.0,
        margin_top: 64.0,
        margin_bottom: 64.0,
        margin_left: 56.0,
        margin_right: 56.0,
    };

    pub fn content_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    fn top(&self) -> f32 {
        self.height - self.margin_top
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::A4
    }
}

/// A run of text in a single font.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub font: Font,
    pub text: String,
}

impl Span {
    pub fn new(font: Font, text: impl Into<String>) -> Self {
        Self {
            font,
            text: text.into(),
        }
    }

    pub fn regular(text: impl Into<String>) -> Self {
        Self::new(Font::Helvetica, text)
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self::new(Font::HelveticaBold, text)
    }
}

#[derive(Debug, Clone)]
pub struct BlockStyle {
    pub size: f32,
    /// Line height as a multiple of the font size.
    pub leading: f32,
    /// Extra left offset from the margin.
    pub indent: f32,
    /// Drawn to the left of the first line, e.g. "-" or "3.".
    pub marker: Option<String>,
    /// Vertical bar to the left of the block (blockquotes).
    pub bar: bool,
    /// Light grey background behind every line (code).
    pub shade: bool,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            size: 10.5,
            leading: 1.4,
            indent: 0.0,
            marker: None,
            bar: false,
            shade: false,
        }
    }
}

impl BlockStyle {
    pub fn sized(size: f32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn indented(mut self, indent: f32) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_bar(mut self, bar: bool) -> Self {
        self.bar = bar;
        self
    }

    pub fn shaded(mut self) -> Self {
        self.shade = true;
        self
    }
}

const MARKER_HANG: f32 = 16.0;
const SHADE_PADDING: f32 = 4.0;
const BAR_OFFSET: f32 = 8.0;

#[derive(Debug, Clone)]
enum Item {
    Text {
        font: Font,
        size: f32,
        x: f32,
        y: f32,
        gray: f32,
        text: String,
    },
    Fill {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        gray: f32,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        gray: f32,
    },
}

pub struct DocumentBuilder {
    layout: PageLayout,
    pages: Vec<Vec<Item>>,
    cursor_y: f32,
    footer: Option<String>,
}

impl DocumentBuilder {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            pages: vec![Vec::new()],
            cursor_y: layout.top(),
            footer: None,
        }
    }

    /// Footer text printed on every page next to "Page n of m".
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn cursor_y(&self) -> f32 {
        self.cursor_y
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.cursor_y = self.layout.top();
    }

    fn at_page_top(&self) -> bool {
        (self.cursor_y - self.layout.top()).abs() < f32::EPSILON
    }

    /// Break the page unless `height` still fits above the bottom margin.
    fn ensure_space(&mut self, height: f32) {
        if self.cursor_y - height < self.layout.margin_bottom && !self.at_page_top() {
            self.new_page();
        }
    }

    /// Vertical gap. Swallowed at the top of a page.
    pub fn space(&mut self, points: f32) {
        if self.at_page_top() {
            return;
        }
        self.cursor_y -= points;
        if self.cursor_y < self.layout.margin_bottom {
            self.new_page();
        }
    }

    fn push(&mut self, item: Item) {
        if let Some(page) = self.pages.last_mut() {
            page.push(item);
        }
    }

    pub fn text(&mut self, text: &str, font: Font, size: f32) {
        self.paragraph(&[Span::new(font, text)], &BlockStyle::sized(size));
    }

    pub fn heading(&mut self, text: &str, size: f32) {
        self.space(size * 0.6);
        self.paragraph(&[Span::bold(text)], &BlockStyle::sized(size));
        self.space(size * 0.3);
    }

    /// Wrap and draw a block of spans. An empty block still advances one line.
    pub fn paragraph(&mut self, spans: &[Span], style: &BlockStyle) {
        let line_height = style.size * style.leading;
        let hang = if style.marker.is_some() { MARKER_HANG } else { 0.0 };
        let pad = if style.shade { SHADE_PADDING } else { 0.0 };
        let block_left = self.layout.margin_left + style.indent;
        let text_left = block_left + hang + pad;
        let max_width = (self.layout.content_width() - style.indent - hang - 2.0 * pad).max(style.size);

        let mut lines = wrap_spans(spans, style.size, max_width);
        if lines.is_empty() {
            lines.push(Vec::new());
        }

        for (i, line) in lines.into_iter().enumerate() {
            self.ensure_space(line_height);
            let top = self.cursor_y;
            let baseline = top - style.size;

            if style.shade {
                self.push(Item::Fill {
                    x: block_left,
                    y: top - line_height,
                    w: self.layout.content_width() - style.indent,
                    h: line_height,
                    gray: 0.93,
                });
            }
            if style.bar {
                let x = block_left - BAR_OFFSET;
                self.push(Item::Line {
                    x1: x,
                    y1: top,
                    x2: x,
                    y2: top - line_height,
                    width: 2.0,
                    gray: 0.7,
                });
            }
            if i == 0 {
                if let Some(marker) = &style.marker {
                    self.push(Item::Text {
                        font: Font::Helvetica,
                        size: style.size,
                        x: block_left,
                        y: baseline,
                        gray: 0.0,
                        text: marker.clone(),
                    });
                }
            }

            let mut x = text_left;
            for span in line {
                let advance = text_width(span.font, style.size, &span.text);
                self.push(Item::Text {
                    font: span.font,
                    size: style.size,
                    x,
                    y: baseline,
                    gray: 0.0,
                    text: span.text,
                });
                x += advance;
            }

            self.cursor_y -= line_height;
        }
    }

    /// Horizontal rule across the content width.
    pub fn rule(&mut self) {
        self.space(6.0);
        self.ensure_space(6.0);
        let y = self.cursor_y;
        self.push(Item::Line {
            x1: self.layout.margin_left,
            y1: y,
            x2: self.layout.width - self.layout.margin_right,
            y2: y,
            width: 0.75,
            gray: 0.75,
        });
        self.cursor_y -= 6.0;
    }

    /// Text drawn on `page` (0-based), in drawing order.
    pub fn page_text(&self, page: usize) -> Vec<&str> {
        self.pages
            .get(page)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Item::Text { text, .. } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, AppError> {
        let total = self.pages.len();
        if let Some(footer) = self.footer.take() {
            let y = self.layout.margin_bottom / 2.0;
            let x = self.layout.margin_left;
            for (i, page) in self.pages.iter_mut().enumerate() {
                page.push(Item::Text {
                    font: Font::Helvetica,
                    size: 8.0,
                    x,
                    y,
                    gray: 0.45,
                    text: format!("{}    Page {} of {}", footer, i + 1, total),
                });
            }
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = lopdf::Dictionary::new();
        for font in Font::ALL {
            let id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), Object::Reference(id));
        }
        let resources_id = doc.add_object(dictionary! { "Font" => fonts });

        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for items in &self.pages {
            let content = Content {
                operations: encode_items(items),
            };
            let bytes = content.encode().map_err(pdf_error)?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => total as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    self.layout.width.into(),
                    self.layout.height.into(),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).map_err(pdf_error)?;
        Ok(buffer)
    }
}

fn encode_items(items: &[Item]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for item in items {
        match item {
            Item::Text {
                font,
                size,
                x,
                y,
                gray,
                text,
            } => {
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("g", vec![(*gray).into()]));
                ops.push(Operation::new(
                    "Tf",
                    vec![Object::Name(font.resource_name().as_bytes().to_vec()), (*size).into()],
                ));
                ops.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(text.as_str())]));
                ops.push(Operation::new("ET", vec![]));
            }
            Item::Fill { x, y, w, h, gray } => {
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new("g", vec![(*gray).into()]));
                ops.push(Operation::new(
                    "re",
                    vec![(*x).into(), (*y).into(), (*w).into(), (*h).into()],
                ));
                ops.push(Operation::new("f", vec![]));
                ops.push(Operation::new("Q", vec![]));
            }
            Item::Line {
                x1,
                y1,
                x2,
                y2,
                width,
                gray,
            } => {
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new("G", vec![(*gray).into()]));
                ops.push(Operation::new("w", vec![(*width).into()]));
                ops.push(Operation::new("m", vec![(*x1).into(), (*y1).into()]));
                ops.push(Operation::new("l", vec![(*x2).into(), (*y2).into()]));
                ops.push(Operation::new("S", vec![]));
                ops.push(Operation::new("Q", vec![]));
            }
        }
    }
    ops
}

enum Piece {
    /// `glue` is the number of spaces before the word.
    Word { font: Font, text: String, glue: usize },
    Break,
}

fn tokenize(spans: &[Span]) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut pending_glue = 0;

    for span in spans {
        for (i, segment) in span.text.split('\n').enumerate() {
            if i > 0 {
                pieces.push(Piece::Break);
                pending_glue = 0;
            }
            let mut word = String::new();
            let mut word_glue = 0;
            for c in segment.chars() {
                if c == ' ' {
                    if !word.is_empty() {
                        pieces.push(Piece::Word {
                            font: span.font,
                            text: std::mem::take(&mut word),
                            glue: word_glue,
                        });
                    }
                    pending_glue += 1;
                } else {
                    if word.is_empty() {
                        word_glue = pending_glue;
                        pending_glue = 0;
                    }
                    word.push(c);
                }
            }
            if !word.is_empty() {
                pieces.push(Piece::Word {
                    font: span.font,
                    text: word,
                    glue: word_glue,
                });
            }
        }
    }
    pieces
}

fn push_span(line: &mut Vec<Span>, font: Font, text: &str) {
    match line.last_mut() {
        Some(last) if last.font == font => last.text.push_str(text),
        _ => line.push(Span::new(font, text)),
    }
}

/// Greedy word wrap across font runs. Words wider than `max_width` are split
/// at character boundaries and `\n` forces a break. Runs of spaces are kept,
/// except where a line was wrapped.
pub fn wrap_spans(spans: &[Span], size: f32, max_width: f32) -> Vec<Vec<Span>> {
    let mut lines = Vec::new();
    let mut line: Vec<Span> = Vec::new();
    let mut width = 0.0_f32;
    // True until the first word after a paragraph start or hard break.
    let mut fresh = true;

    for piece in tokenize(spans) {
        match piece {
            Piece::Break => {
                lines.push(std::mem::take(&mut line));
                width = 0.0;
                fresh = true;
            }
            Piece::Word { font, text, glue } => {
                let word_width = text_width(font, size, &text);
                // Inter-word space belongs to the run before it.
                let gap_font = line.last().map(|s: &Span| s.font).unwrap_or(font);
                let mut glue = if line.is_empty() && !fresh { 0 } else { glue };
                let mut gap = glue as f32 * text_width(gap_font, size, " ");

                if !line.is_empty() && width + gap + word_width > max_width {
                    lines.push(std::mem::take(&mut line));
                    width = 0.0;
                    gap = 0.0;
                    glue = 0;
                }
                fresh = false;

                if gap > 0.0 && width + gap + word_width <= max_width {
                    push_span(&mut line, gap_font, &" ".repeat(glue));
                    width += gap;
                }

                if word_width > max_width {
                    let mut chunk = String::new();
                    let mut chunk_width = 0.0_f32;
                    for c in text.chars() {
                        let cw = f32::from(font.glyph_width(c)) * size / 1000.0;
                        if !chunk.is_empty() && width + chunk_width + cw > max_width {
                            push_span(&mut line, font, &chunk);
                            lines.push(std::mem::take(&mut line));
                            chunk.clear();
                            chunk_width = 0.0;
                            width = 0.0;
                        }
                        chunk.push(c);
                        chunk_width += cw;
                    }
                    push_span(&mut line, font, &chunk);
                    width += chunk_width;
                } else {
                    push_span(&mut line, font, &text);
                    width += word_width;
                }
            }
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Single-font convenience over [`wrap_spans`].
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    wrap_spans(&[Span::new(font, text)], size, max_width)
        .into_iter()
        .map(|line| line.into_iter().map(|s| s.text).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_within_width() {
        let text = "the quick brown fox jumps over the lazy dog";
        let lines = wrap_text(text, Font::Helvetica, 10.0, 80.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(Font::Helvetica, 10.0, line) <= 80.0, "{line}");
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        let word = "a".repeat(200);
        let lines = wrap_text(&word, Font::Courier, 10.0, 60.0);
        // 600/1000 * 10 = 6pt per glyph, 10 glyphs per line
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|l| l.len() == 10));
    }

    #[test]
    fn keeps_font_runs_and_hard_breaks() {
        let spans = vec![
            Span::regular("Owner: "),
            Span::bold("Acme"),
            Span::regular("Inc\nsecond line"),
        ];
        let lines = wrap_spans(&spans, 10.0, 500.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            vec![Span::regular("Owner: "), Span::bold("Acme"), Span::regular("Inc")]
        );
        assert_eq!(lines[1], vec![Span::regular("second line")]);
    }

    #[test]
    fn keeps_leading_indentation_on_hard_lines() {
        let lines = wrap_text("fn main() {\n    run();\n}", Font::Courier, 9.0, 400.0);
        assert_eq!(lines, vec!["fn main() {", "    run();", "}"]);
    }

    #[test]
    fn breaks_pages_when_cursor_reaches_bottom() {
        let mut builder = DocumentBuilder::new(PageLayout::A4);
        for i in 0..120 {
            builder.text(&format!("Line {i}"), Font::Helvetica, 10.0);
        }
        assert!(builder.page_count() >= 2);
        assert!(!builder.page_text(1).is_empty());
        assert!(builder.page_text(0).contains(&"Line 0"));
    }

    #[test]
    fn finish_produces_loadable_pdf() {
        let mut builder = DocumentBuilder::new(PageLayout::A4).with_footer("Test");
        builder.heading("Title", 18.0);
        builder.paragraph(
            &[Span::regular("code line")],
            &BlockStyle::sized(9.0).shaded().with_bar(true),
        );
        builder.new_page();
        builder.rule();
        let bytes = builder.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }
}
