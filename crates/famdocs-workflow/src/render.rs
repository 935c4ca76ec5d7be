//! [`PdfRenderer`]: generated text to a PDF 1.4 document via `lopdf`.
//!
//! Output uses the standard Helvetica fonts, so no font data is embedded.
//! Widths are estimated from a fixed average glyph width, which keeps the
//! layout deterministic for a given input.

use chrono::NaiveDate;
use famdocs_core::services::{DocumentRenderer, RenderError};
use lopdf::{
  Dictionary, Document, Object, ObjectId, Stream,
  content::{Content, Operation},
  dictionary,
};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;

const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 12.0;
const LEADING: f32 = 14.4;
const PARAGRAPH_GAP: f32 = 12.0;
const TITLE_GAP: f32 = 30.0;

/// Average Helvetica advance width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl DocumentRenderer for PdfRenderer {
  fn render(&self, title: &str, body: &str, date: NaiveDate) -> Result<Vec<u8>, RenderError> {
    let title = title.trim();
    if title.is_empty() {
      return Err(RenderError::Empty("title"));
    }
    if body.trim().is_empty() {
      return Err(RenderError::Empty("body"));
    }

    let pages = layout(title, body, date);
    build(&pages).map_err(|e| RenderError::Failed(e.to_string()))
  }
}

// ─── Layout ──────────────────────────────────────────────────────────────────

/// One positioned run of text.
struct Line {
  font: &'static str,
  size: f32,
  x:    f32,
  y:    f32,
  text: String,
}

fn text_width(text: &str, size: f32) -> f32 {
  text.chars().count() as f32 * size * AVG_GLYPH_WIDTH
}

/// Greedy word wrap. Words longer than a full line are hard-split.
fn wrap(paragraph: &str, size: f32, max_width: f32) -> Vec<String> {
  let max_chars = ((max_width / (size * AVG_GLYPH_WIDTH)) as usize).max(1);
  let mut lines = Vec::new();
  let mut current = String::new();

  for word in paragraph.split_whitespace() {
    let mut word: Vec<char> = word.chars().collect();
    while word.len() > max_chars {
      if !current.is_empty() {
        lines.push(std::mem::take(&mut current));
      }
      let rest = word.split_off(max_chars);
      lines.push(word.into_iter().collect());
      word = rest;
    }
    let word: String = word.into_iter().collect();

    let needed = if current.is_empty() {
      word.chars().count()
    } else {
      current.chars().count() + 1 + word.chars().count()
    };
    if needed > max_chars && !current.is_empty() {
      lines.push(std::mem::take(&mut current));
    }
    if !current.is_empty() {
      current.push(' ');
    }
    current.push_str(&word);
  }
  if !current.is_empty() {
    lines.push(current);
  }
  lines
}

fn layout(title: &str, body: &str, date: NaiveDate) -> Vec<Vec<Line>> {
  let usable = PAGE_WIDTH - 2.0 * MARGIN;
  let top = PAGE_HEIGHT - MARGIN;

  let mut pages: Vec<Vec<Line>> = vec![Vec::new()];
  let mut y = top;

  let place = |pages: &mut Vec<Vec<Line>>, y: &mut f32, line: Line| {
    if *y - line.size < MARGIN {
      pages.push(Vec::new());
      *y = top;
    }
    let line = Line { y: *y - line.size, ..line };
    *y -= LEADING.max(line.size * 1.2);
    if let Some(page) = pages.last_mut() {
      page.push(line);
    }
  };

  for text in wrap(title, TITLE_SIZE, usable) {
    let x = (PAGE_WIDTH - text_width(&text, TITLE_SIZE)).max(2.0 * MARGIN) / 2.0;
    place(&mut pages, &mut y, Line {
      font: "F2",
      size: TITLE_SIZE,
      x,
      y: 0.0,
      text,
    });
  }
  y -= TITLE_GAP;

  place(&mut pages, &mut y, Line {
    font: "F1",
    size: BODY_SIZE,
    x:    MARGIN,
    y:    0.0,
    text: format!("Date: {}", date.format("%d/%m/%Y")),
  });
  y -= PARAGRAPH_GAP;

  for paragraph in body.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
    for text in wrap(paragraph, BODY_SIZE, usable) {
      place(&mut pages, &mut y, Line {
        font: "F1",
        size: BODY_SIZE,
        x: MARGIN,
        y: 0.0,
        text,
      });
    }
    y -= PARAGRAPH_GAP;
  }

  pages
}

// ─── Document ────────────────────────────────────────────────────────────────

/// Encode text for a WinAnsi literal. Only printable ASCII and the Latin-1
/// supplement share code points with WinAnsi; anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
  text
    .chars()
    .map(|c| match c {
      ' '..='~' | '\u{a0}'..='\u{ff}' => u32::from(c) as u8,
      _ => b'?',
    })
    .collect()
}

fn operations(lines: &[Line]) -> Vec<Operation> {
  lines
    .iter()
    .flat_map(|line| {
      [
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![line.font.into(), line.size.into()]),
        Operation::new("Td", vec![line.x.into(), line.y.into()]),
        Operation::new("Tj", vec![Object::string_literal(win_ansi(&line.text))]),
        Operation::new("ET", vec![]),
      ]
    })
    .collect()
}

fn helvetica(base: &str) -> Dictionary {
  dictionary! {
    "Type" => "Font",
    "Subtype" => "Type1",
    "BaseFont" => base,
    "Encoding" => "WinAnsiEncoding",
  }
}

/// Catalog, page tree with shared font resources, then one page and content
/// stream per laid-out page.
fn build(pages: &[Vec<Line>]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
  let mut doc = Document::with_version("1.4");
  let pages_id = doc.new_object_id();

  let regular = doc.add_object(helvetica("Helvetica"));
  let bold = doc.add_object(helvetica("Helvetica-Bold"));
  let resources = doc.add_object(dictionary! {
    "Font" => dictionary! { "F1" => regular, "F2" => bold },
  });

  let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
  for lines in pages {
    let content = Content {
      operations: operations(lines),
    };
    let contents = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page: ObjectId = doc.add_object(dictionary! {
      "Type" => "Page",
      "Parent" => pages_id,
      "Contents" => contents,
    });
    kids.push(page.into());
  }

  let count = kids.len() as i64;
  doc.objects.insert(
    pages_id,
    Object::Dictionary(dictionary! {
      "Type" => "Pages",
      "Kids" => kids,
      "Count" => count,
      "Resources" => resources,
      "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    }),
  );
  let catalog = doc.add_object(dictionary! {
    "Type" => "Catalog",
    "Pages" => pages_id,
  });
  doc.trailer.set("Root", catalog);

  let mut out = Vec::new();
  doc.save_to(&mut out)?;
  Ok(out)
}
