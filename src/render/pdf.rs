//! Typesets layout blocks onto A4 pages and serializes them with lopdf.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

use super::RenderError;
use super::fonts::{Font, encode_win_ansi};
use super::layout::{Align, Block, BulletItem, MetricRow, TITLE};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 40.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const CONTENT_TOP: f32 = PAGE_HEIGHT - MARGIN;

const BODY_SIZE: f32 = 10.0;
const BODY_LEADING: f32 = 12.0;
const TITLE_SIZE: f32 = 18.0;
const TITLE_LEADING: f32 = 22.0;
const HEADING_SIZE: f32 = 14.0;
const HEADING_LEADING: f32 = 18.0;
const HEADING_SPACE_BEFORE: f32 = 12.0;
const FOOTER_SIZE: f32 = 8.0;
const FOOTER_BASELINE: f32 = 20.0;

const PARAGRAPH_GAP: f32 = 6.0;
const BULLET_INDENT: f32 = 20.0;
const BULLET_OFFSET: f32 = 8.0;

const METRIC_COLUMN: f32 = 270.0;
const VALUE_COLUMN: f32 = 200.0;
const CELL_PAD_X: f32 = 6.0;
const CELL_PAD_Y: f32 = 3.0;
const HEADER_GREY: f32 = 0.827;
const GRID_GREY: f32 = 0.5;
const GRID_WIDTH: f32 = 0.5;

#[derive(Debug)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

pub fn write_pdf(blocks: &[Block]) -> Result<RenderedPdf, RenderError> {
    let mut composer = Composer::new();
    for block in blocks {
        composer.block(block);
    }
    let pages = composer.finish();
    let page_count = pages.len();
    let bytes = serialize(pages)?;
    Ok(RenderedPdf { bytes, page_count })
}

/// One word in a single font, already encoded and measured.
#[derive(Debug, Clone)]
struct Word {
    font: Font,
    text: Vec<u8>,
    width: f32,
}

#[derive(Debug, Default)]
struct Line {
    words: Vec<Word>,
    /// Natural width with single spaces between words.
    width: f32,
}

fn space_width(size: f32) -> f32 {
    Font::Regular.width(b" ", size)
}

fn words_in(font: Font, text: &str, size: f32) -> Vec<Word> {
    text.split_whitespace()
        .map(|token| {
            let text = encode_win_ansi(token);
            let width = font.width(&text, size);
            Word { font, text, width }
        })
        .collect()
}

/// Words of a paragraph whose optional lead run is set in bold.
fn words_of(lead: Option<&str>, text: &str, size: f32) -> Vec<Word> {
    let mut words = lead
        .map(|lead| words_in(Font::Bold, lead, size))
        .unwrap_or_default();
    words.extend(words_in(Font::Regular, text, size));
    words
}

/// Breaks a word wider than `max_width` into pieces that fit.
fn split_overlong(word: Word, max_width: f32, size: f32) -> Vec<Word> {
    if word.width <= max_width {
        return vec![word];
    }

    let mut pieces = Vec::new();
    let mut chunk = Vec::new();
    let mut chunk_width = 0.0;
    for &byte in &word.text {
        let glyph = f32::from(word.font.glyph_width(byte)) * size / 1000.0;
        if !chunk.is_empty() && chunk_width + glyph > max_width {
            pieces.push(Word {
                font: word.font,
                text: std::mem::take(&mut chunk),
                width: chunk_width,
            });
            chunk_width = 0.0;
        }
        chunk.push(byte);
        chunk_width += glyph;
    }
    if !chunk.is_empty() {
        pieces.push(Word {
            font: word.font,
            text: chunk,
            width: chunk_width,
        });
    }
    pieces
}

fn wrap(words: Vec<Word>, max_width: f32, size: f32) -> Vec<Line> {
    let space = space_width(size);
    let mut lines = Vec::new();
    let mut current = Line::default();

    for piece in words
        .into_iter()
        .flat_map(|word| split_overlong(word, max_width, size))
    {
        if current.words.is_empty() {
            current.width = piece.width;
            current.words.push(piece);
            continue;
        }
        let needed = current.width + space + piece.width;
        if needed > max_width {
            lines.push(std::mem::take(&mut current));
            current.width = piece.width;
        } else {
            current.width = needed;
        }
        current.words.push(piece);
    }

    if !current.words.is_empty() {
        lines.push(current);
    }
    lines
}

fn real(value: f32) -> Object {
    value.into()
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

struct Composer {
    finished: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl Composer {
    fn new() -> Self {
        Self {
            finished: Vec::new(),
            current: Vec::new(),
            y: CONTENT_TOP,
        }
    }

    fn at_page_top(&self) -> bool {
        self.y >= CONTENT_TOP
    }

    fn new_page(&mut self) {
        self.finished.push(std::mem::take(&mut self.current));
        self.y = CONTENT_TOP;
    }

    /// Starts a new page unless `height` fits below the cursor. Returns
    /// whether a page break happened.
    fn reserve(&mut self, height: f32) -> bool {
        if self.y - height < MARGIN && !self.at_page_top() {
            self.new_page();
            return true;
        }
        false
    }

    fn text(&mut self, font: Font, size: f32, x: f32, baseline: f32, bytes: Vec<u8>) {
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![name(font.resource()), real(size)]),
            Operation::new("Td", vec![real(x), real(baseline)]),
            Operation::new("Tj", vec![Object::string_literal(bytes)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, paint: &str) {
        self.current.extend([
            Operation::new("re", vec![real(x), real(y), real(width), real(height)]),
            Operation::new(paint, vec![]),
        ]);
    }

    fn draw_line(&mut self, line: &Line, size: f32, x: f32, baseline: f32, room: f32, align: Align, last: bool) {
        let space = space_width(size);
        let slack = (room - line.width).max(0.0);
        let gaps = line.words.len().saturating_sub(1);

        let (start, gap) = match align {
            Align::Center => (x + slack / 2.0, space),
            Align::Justify if !last && gaps > 0 => (x, space + slack / gaps as f32),
            Align::Left | Align::Justify => (x, space),
        };

        let mut cursor = start;
        for word in &line.words {
            self.text(word.font, size, cursor, baseline, word.text.clone());
            cursor += word.width + gap;
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Title(text) => {
                let lines = wrap(words_in(Font::Bold, text, TITLE_SIZE), CONTENT_WIDTH, TITLE_SIZE);
                self.lines(&lines, TITLE_SIZE, TITLE_LEADING, MARGIN, CONTENT_WIDTH, Align::Center);
                self.y -= PARAGRAPH_GAP;
            }
            Block::Heading(text) => self.heading(text),
            Block::Paragraph { lead, text, align } => {
                let lines = wrap(words_of(lead.as_deref(), text, BODY_SIZE), CONTENT_WIDTH, BODY_SIZE);
                self.lines(&lines, BODY_SIZE, BODY_LEADING, MARGIN, CONTENT_WIDTH, *align);
                self.y -= PARAGRAPH_GAP;
            }
            Block::MetricsTable(rows) => self.metrics_table(rows),
            Block::Bullets(items) => {
                for item in items {
                    self.bullet(item);
                }
            }
            Block::Spacer(height) => {
                if self.y - height < MARGIN {
                    if !self.at_page_top() {
                        self.new_page();
                    }
                } else {
                    self.y -= height;
                }
            }
        }
    }

    fn lines(&mut self, lines: &[Line], size: f32, leading: f32, x: f32, room: f32, align: Align) {
        for (i, line) in lines.iter().enumerate() {
            self.reserve(leading);
            let baseline = self.y - size;
            self.draw_line(line, size, x, baseline, room, align, i + 1 == lines.len());
            self.y -= leading;
        }
    }

    fn heading(&mut self, text: &str) {
        // Keep the heading with the first line of what follows.
        self.reserve(HEADING_SPACE_BEFORE + HEADING_LEADING + PARAGRAPH_GAP + BODY_LEADING);
        if !self.at_page_top() {
            self.y -= HEADING_SPACE_BEFORE;
        }
        let lines = wrap(words_in(Font::Bold, text, HEADING_SIZE), CONTENT_WIDTH, HEADING_SIZE);
        self.lines(&lines, HEADING_SIZE, HEADING_LEADING, MARGIN, CONTENT_WIDTH, Align::Left);
        self.y -= PARAGRAPH_GAP;
    }

    fn bullet(&mut self, item: &BulletItem) {
        let room = CONTENT_WIDTH - BULLET_INDENT;
        let lines = wrap(
            words_of(item.lead.as_deref(), &item.text, BODY_SIZE),
            room,
            BODY_SIZE,
        );
        if lines.is_empty() {
            return;
        }

        self.reserve(BODY_LEADING);
        self.text(
            Font::Regular,
            BODY_SIZE,
            MARGIN + BULLET_OFFSET,
            self.y - BODY_SIZE,
            encode_win_ansi("\u{2022}"),
        );
        self.lines(&lines, BODY_SIZE, BODY_LEADING, MARGIN + BULLET_INDENT, room, Align::Justify);
        self.y -= PARAGRAPH_GAP;
    }

    fn metrics_table(&mut self, rows: &[MetricRow]) {
        let left = MARGIN + (CONTENT_WIDTH - METRIC_COLUMN - VALUE_COLUMN) / 2.0;
        let header = TableRow::new("Metric", "Value", Font::Bold);
        let body: Vec<TableRow> = rows
            .iter()
            .map(|row| TableRow::new(&row.label, &row.value, Font::Regular))
            .collect();

        // Tallest row that still fits on a page under a repeated header.
        let page_room = CONTENT_TOP - MARGIN - header.height();
        let first_height = body.first().map_or(0.0, |row| {
            if row.height() <= page_room {
                row.height()
            } else {
                TableRow::height_of(1)
            }
        });
        self.reserve(header.height() + first_height);
        self.table_row(&header, left, true);

        for row in body {
            if row.height() <= page_room {
                if self.reserve(row.height()) {
                    self.table_row(&header, left, true);
                }
                self.table_row(&row, left, false);
            } else {
                self.split_row(row, &header, left);
            }
        }
    }

    /// Draws a row taller than a page in pieces, filling the rest of the
    /// current page and continuing under a repeated header.
    fn split_row(&mut self, mut row: TableRow, header: &TableRow, left: f32) {
        loop {
            let fit = TableRow::lines_fitting(self.y - MARGIN);
            if row.line_count() <= fit {
                self.table_row(&row, left, false);
                return;
            }
            if fit > 0 {
                let head = row.take_lines(fit);
                self.table_row(&head, left, false);
            }
            self.new_page();
            self.table_row(header, left, true);
        }
    }

    fn table_row(&mut self, row: &TableRow, left: f32, header: bool) {
        let height = row.height();
        let top = self.y;
        let bottom = top - height;
        let width = METRIC_COLUMN + VALUE_COLUMN;

        if header {
            self.current.push(Operation::new("g", vec![real(HEADER_GREY)]));
            self.rect(left, bottom, width, height, "f");
            self.current.push(Operation::new("g", vec![real(0.0)]));
        }

        let cells = [
            (&row.metric, left, METRIC_COLUMN, CellAlign::Left),
            (
                &row.value,
                left + METRIC_COLUMN,
                VALUE_COLUMN,
                if header { CellAlign::Left } else { CellAlign::Right },
            ),
        ];
        for (lines, x, column, align) in cells {
            // Vertically centred within the row.
            let offset = (height - lines.len() as f32 * BODY_LEADING) / 2.0;
            let mut baseline = top - offset - BODY_SIZE;
            for line in lines {
                let room = column - 2.0 * CELL_PAD_X;
                let start = match align {
                    CellAlign::Left => x + CELL_PAD_X,
                    CellAlign::Right => x + CELL_PAD_X + (room - line.width).max(0.0),
                };
                self.draw_line(line, BODY_SIZE, start, baseline, room, Align::Left, true);
                baseline -= BODY_LEADING;
            }
        }

        self.current.extend([
            Operation::new("G", vec![real(GRID_GREY)]),
            Operation::new("w", vec![real(GRID_WIDTH)]),
        ]);
        self.rect(left, bottom, METRIC_COLUMN, height, "S");
        self.rect(left + METRIC_COLUMN, bottom, VALUE_COLUMN, height, "S");

        self.y = bottom;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        self.new_page();
        let total = self.finished.len();

        for (index, ops) in self.finished.iter_mut().enumerate() {
            let label = encode_win_ansi(&format!("Page {} of {}", index + 1, total));
            let x = (PAGE_WIDTH - Font::Regular.width(&label, FOOTER_SIZE)) / 2.0;
            ops.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![name(Font::Regular.resource()), real(FOOTER_SIZE)]),
                Operation::new("Td", vec![real(x), real(FOOTER_BASELINE)]),
                Operation::new("Tj", vec![Object::string_literal(label)]),
                Operation::new("ET", vec![]),
            ]);
        }

        self.finished
    }
}

#[derive(Clone, Copy)]
enum CellAlign {
    Left,
    Right,
}

struct TableRow {
    metric: Vec<Line>,
    value: Vec<Line>,
}

impl TableRow {
    fn new(metric: &str, value: &str, font: Font) -> Self {
        let cell = |text: &str, column: f32| {
            wrap(words_in(font, text, BODY_SIZE), column - 2.0 * CELL_PAD_X, BODY_SIZE)
        };
        Self {
            metric: cell(metric, METRIC_COLUMN),
            value: cell(value, VALUE_COLUMN),
        }
    }

    fn line_count(&self) -> usize {
        self.metric.len().max(self.value.len()).max(1)
    }

    fn height(&self) -> f32 {
        Self::height_of(self.line_count())
    }

    fn height_of(lines: usize) -> f32 {
        lines as f32 * BODY_LEADING + 2.0 * CELL_PAD_Y
    }

    /// Number of lines a row may hold within `room` points.
    fn lines_fitting(room: f32) -> usize {
        ((room - 2.0 * CELL_PAD_Y) / BODY_LEADING).floor().max(0.0) as usize
    }

    /// Splits off the first `count` lines of both cells.
    fn take_lines(&mut self, count: usize) -> TableRow {
        let take = |cell: &mut Vec<Line>| {
            let rest = cell.split_off(count.min(cell.len()));
            std::mem::replace(cell, rest)
        };
        TableRow {
            metric: take(&mut self.metric),
            value: take(&mut self.value),
        }
    }
}

fn font_dictionary(font: Font) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    }
}

fn serialize(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font_dictionary(Font::Regular));
    let bold_id = doc.add_object(font_dictionary(Font::Bold));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource() => regular_id,
            Font::Bold.resource() => bold_id,
        },
    });

    let page_count = pages.len();
    let mut kids = Vec::with_capacity(page_count);
    for operations in pages {
        let encoded = Content { operations }
            .encode()
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_count as i64),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(PAGE_WIDTH),
                real(PAGE_HEIGHT),
            ],
        }),
    );

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(TITLE),
        "Producer" => Object::string_literal("insight-report-generator"),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(bytes)
}
