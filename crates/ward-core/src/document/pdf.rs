//! PDF rendering of introduction letters

use super::letter::IntroductionLetter;
use crate::error::{Result, WardError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// US Letter in points
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const INCH: f32 = 72.0;

const BODY_FONT_SIZE: f32 = 11.0;
const BODY_LINE_HEIGHT: f32 = 20.0;
const BOTTOM_MARGIN: f32 = INCH;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

/// Rough Helvetica advance width, enough for centring and wrapping
fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let factor = if bold { 0.56 } else { 0.5 };
    text.chars().count() as f32 * size * factor
}

/// Split a line so that it fits between the side margins
fn wrap_line(line: &str, size: f32) -> Vec<String> {
    let max_width = PAGE_WIDTH - 2.0 * INCH;
    if text_width(line, size, false) <= max_width {
        return vec![line.to_string()];
    }

    let indent: String = line.chars().take_while(|c| *c == ' ').collect();
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let candidate = if current.is_empty() {
            format!("{}{}", indent, word)
        } else {
            format!("{} {}", current, word)
        };
        if !current.is_empty() && text_width(&candidate, size, false) > max_width {
            lines.push(std::mem::replace(&mut current, format!("{}{}", indent, word)));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encode text for the standard fonts' WinAnsiEncoding. Unmappable characters print as `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
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
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
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

#[derive(Default)]
struct PageContent {
    operations: Vec<Operation>,
}

impl PageContent {
    fn text(&mut self, font: &str, size: f32, x: f32, y: f32, text: &str) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi_bytes(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn centred(&mut self, font: &str, size: f32, y: f32, text: &str) {
        let width = text_width(text, size, font == BOLD);
        self.text(font, size, (PAGE_WIDTH - width) / 2.0, y, text);
    }

    fn right_aligned(&mut self, font: &str, size: f32, right: f32, y: f32, text: &str) {
        let width = text_width(text, size, font == BOLD);
        self.text(font, size, right - width, y, text);
    }
}

/// Render the letter as a PDF document
pub fn render_pdf(letter: &IntroductionLetter) -> Result<Vec<u8>> {
    let mut pages = Vec::new();
    let mut page = PageContent::default();

    // Letterhead
    page.centred(BOLD, 18.0, PAGE_HEIGHT - 0.8 * INCH, &letter.office_name);
    page.centred(REGULAR, 10.0, PAGE_HEIGHT - INCH, &format!("Ward: {}", letter.ward));
    page.centred(REGULAR, 10.0, PAGE_HEIGHT - 1.2 * INCH, &letter.contact_line);

    page.right_aligned(
        REGULAR,
        10.0,
        PAGE_WIDTH - INCH,
        PAGE_HEIGHT - 1.8 * INCH,
        &format!("Reference No.: {}", letter.reference_number),
    );
    page.right_aligned(
        REGULAR,
        10.0,
        PAGE_WIDTH - INCH,
        PAGE_HEIGHT - 2.0 * INCH,
        &format!("Date: {}", letter.date),
    );

    page.text(BOLD, 12.0, INCH, PAGE_HEIGHT - 2.5 * INCH, &format!("RE: {}", letter.subject));

    let mut y = PAGE_HEIGHT - 3.0 * INCH;
    for line in letter.body.iter().flat_map(|l| wrap_line(l, BODY_FONT_SIZE)) {
        if y < BOTTOM_MARGIN {
            pages.push(std::mem::take(&mut page));
            y = PAGE_HEIGHT - INCH;
        }
        if !line.is_empty() {
            page.text(REGULAR, BODY_FONT_SIZE, INCH, y, &line);
        }
        y -= BODY_LINE_HEIGHT;
    }
    pages.push(page);

    build_document(pages)
}

fn build_document(pages: Vec<PageContent>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content {
            operations: page.operations,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| WardError::Document(format!("Failed to serialize PDF: {}", e)))?;
    Ok(bytes)
}

/// Check PDF magic bytes
pub fn validate_pdf(pdf_data: &[u8]) -> bool {
    pdf_data.len() >= 4 && pdf_data.starts_with(b"%PDF")
}
