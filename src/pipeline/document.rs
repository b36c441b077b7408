//! PDF rendering of a saved spreadsheet report.
//!
//! The document is derived from the report *file*, not from in-memory
//! results, so what prints is exactly what the spreadsheet holds. Thumbnails
//! are not reproduced; each entry is text only:
//!
//! ```text
//! Image Analysis Results          ← title, once
//! Image: a.png                    ← heading per row
//! <analysis text, wrapped>        ← paragraph, verbatim (error markers too)
//! ─────────────────────────────── ← separator
//! ```
//!
//! ## Why the base-14 Helvetica fonts?
//! They need no embedding, so the writer stays dependency-light and the
//! output is small. The trade-off is WinAnsi encoding: Latin-1 plus the
//! common typographic punctuation renders, anything else prints as `?`.
//!
//! Line wrapping uses the Helvetica AFM advance widths, so lines fill the
//! text column closely without measuring glyphs at render time.

use crate::error::Img2ReportError;
use crate::output::artifact_file_name;
use crate::pipeline::table::{read_report_rows, ReportEntry};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DOCUMENT_TITLE: &str = "Image Analysis Results";

// ── Page geometry (points) ───────────────────────────────────────────────

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
/// 30 mm on every side.
const MARGIN: f32 = 85.04;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

#[derive(Debug, Clone, Copy, PartialEq)]
struct TextStyle {
    font: &'static str,
    size: f32,
    leading: f32,
}

const TITLE_STYLE: TextStyle = TextStyle {
    font: BOLD,
    size: 18.0,
    leading: 24.0,
};
const HEADING_STYLE: TextStyle = TextStyle {
    font: BOLD,
    size: 14.0,
    leading: 18.0,
};
const BODY_STYLE: TextStyle = TextStyle {
    font: REGULAR,
    size: 10.0,
    leading: 14.0,
};

/// Logical document structure, before pagination.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading(String),
    Paragraph(String),
    /// Vertical gap in points.
    Spacer(f32),
    Separator,
}

/// Document structure for the given report rows.
pub fn layout_blocks(entries: &[ReportEntry]) -> Vec<Block> {
    let mut blocks = vec![Block::Title(DOCUMENT_TITLE.to_string()), Block::Spacer(12.0)];
    for entry in entries {
        blocks.push(Block::Heading(format!("Image: {}", entry.image_name)));
        blocks.push(Block::Spacer(12.0));
        blocks.push(Block::Paragraph(entry.analysis_text.clone()));
        blocks.push(Block::Spacer(20.0));
        blocks.push(Block::Separator);
        blocks.push(Block::Spacer(20.0));
    }
    blocks
}

/// Render the report at `report_path` into a uniquely named PDF in `output_dir`.
pub fn render_document(report_path: &Path, output_dir: &Path) -> Result<PathBuf, Img2ReportError> {
    let entries = read_report_rows(report_path)?;
    let path = output_dir.join(artifact_file_name("pdf"));
    let pages = write_blocks(&layout_blocks(&entries), &path)?;
    info!(
        "Document saved: {} ({} entries, {} pages)",
        path.display(),
        entries.len(),
        pages
    );
    Ok(path)
}

/// Paginate `blocks` and save them as a PDF at `path`. Returns the page count.
pub fn write_blocks(blocks: &[Block], path: &Path) -> Result<usize, Img2ReportError> {
    let failed = |detail: String| Img2ReportError::DocumentRenderFailed {
        path: path.to_path_buf(),
        detail,
    };

    let pages = paginate(blocks);
    let page_count = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(font_dict("Helvetica"));
    let bold_id = doc.add_object(font_dict("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    for operations in pages {
        let content = Content { operations };
        let bytes = content.encode().map_err(|e| failed(e.to_string()))?;
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
            "Count" => page_count as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path).map_err(|e| failed(e.to_string()))?;
    Ok(page_count)
}

fn font_dict(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

// ── Pagination ───────────────────────────────────────────────────────────

struct PageWriter {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn at_page_top(&self) -> bool {
        self.y >= PAGE_HEIGHT - MARGIN
    }

    /// Start a new page unless `height` more points fit on this one.
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN && !self.at_page_top() {
            self.pages.push(std::mem::take(&mut self.current));
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn space(&mut self, height: f32) {
        // Gaps never carry over to the top of a fresh page.
        if !self.at_page_top() {
            self.y -= height;
        }
    }

    fn line(&mut self, style: TextStyle, text: &str) {
        self.reserve(style.leading);
        self.y -= style.leading;
        if text.is_empty() {
            return;
        }
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![style.font.into(), style.size.into()]),
            Operation::new("Td", vec![MARGIN.into(), self.y.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn rule(&mut self) {
        self.reserve(8.0);
        self.y -= 4.0;
        self.current.extend([
            Operation::new("q", vec![]),
            Operation::new("G", vec![0.6f32.into()]),
            Operation::new("w", vec![0.5f32.into()]),
            Operation::new("m", vec![MARGIN.into(), self.y.into()]),
            Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), self.y.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
        self.y -= 4.0;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn paginate(blocks: &[Block]) -> Vec<Vec<Operation>> {
    let mut writer = PageWriter::new();
    for block in blocks {
        match block {
            Block::Title(text) => write_wrapped(&mut writer, TITLE_STYLE, text),
            Block::Heading(text) => write_wrapped(&mut writer, HEADING_STYLE, text),
            Block::Paragraph(text) => write_wrapped(&mut writer, BODY_STYLE, text),
            Block::Spacer(height) => writer.space(*height),
            Block::Separator => writer.rule(),
        }
    }
    writer.finish()
}

fn write_wrapped(writer: &mut PageWriter, style: TextStyle, text: &str) {
    let bold = style.font == BOLD;
    for line in wrap_text(text, style.size, bold, TEXT_WIDTH) {
        writer.line(style, &line);
    }
}

// ── Text measurement ─────────────────────────────────────────────────────

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {..~
];

/// Helvetica-Bold advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    333, 333, 584, 584, 584, 611, 975, // :..@
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    333, 278, 333, 584, 556, 333, // [..`
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a-m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n-z
    389, 280, 389, 584, // {..~
];

/// Width assumed for characters outside printable ASCII.
const DEFAULT_WIDTH: u16 = 556;
const DEFAULT_BOLD_WIDTH: u16 = 611;

/// Advance width of `c` in 1/1000 em.
fn glyph_width(c: char, bold: bool) -> u32 {
    let (table, fallback) = if bold {
        (&HELVETICA_BOLD_WIDTHS, DEFAULT_BOLD_WIDTH)
    } else {
        (&HELVETICA_WIDTHS, DEFAULT_WIDTH)
    };
    let code = c as u32;
    if (32..=126).contains(&code) {
        table[(code - 32) as usize] as u32
    } else {
        fallback as u32
    }
}

/// Width of `text` in points at `size`.
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let units: u32 = text.chars().map(|c| glyph_width(c, bold)).sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap. Explicit newlines are kept; a single word wider than
/// `max_width` is broken between characters.
pub fn wrap_text(text: &str, size: f32, bold: bool, max_width: f32) -> Vec<String> {
    let fits = |s: &str| text_width(s, size, bold) <= max_width;
    let mut lines = Vec::new();

    for hard_line in text.lines() {
        let mut current = String::new();
        for word in hard_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if fits(word) {
                current = word.to_string();
            } else {
                for c in word.chars() {
                    current.push(c);
                    if !fits(&current) {
                        current.pop();
                        lines.push(std::mem::take(&mut current));
                        current.push(c);
                    }
                }
            }
        }
        lines.push(current);
    }
    lines
}

/// Encode for a WinAnsiEncoding base-14 font.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\t' => b' ',
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8a,
            '‹' => 0x8b,
            'Œ' => 0x8c,
            'Ž' => 0x8e,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '•' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9a,
            '›' => 0x9b,
            'œ' => 0x9c,
            'ž' => 0x9e,
            'Ÿ' => 0x9f,
            _ => b'?',
        })
        .collect()
}
