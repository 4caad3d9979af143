//! Minimal single-page PDF writer on top of `lopdf`.

use crate::Result;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// A4 in points.
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";
const IMAGE_NAME: &str = "Im1";

/// Accumulates drawing operations for one page.
#[derive(Default)]
pub struct Page {
    operations: Vec<Operation>,
}

impl Page {
    pub fn text(&mut self, x: f32, y: f32, size: f32, bold: bool, text: &str) {
        let font = if bold { BOLD_FONT } else { REGULAR_FONT };
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), real(size)]),
            Operation::new("Td", vec![real(x), real(y)]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    pub fn fill_colour(&mut self, rgb: [f32; 3]) {
        self.operations.push(Operation::new(
            "rg",
            rgb.iter().map(|&c| real(c)).collect(),
        ));
    }

    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.operations.extend([
            Operation::new(
                "re",
                vec![
                    real(x),
                    real(y),
                    real(width),
                    real(height),
                ],
            ),
            Operation::new("f", vec![]),
        ]);
    }

    /// Draws the page image with its lower-left corner at `(x, y)`.
    pub fn image(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(width),
                    real(0.0),
                    real(0.0),
                    real(height),
                    real(x),
                    real(y),
                ],
            ),
            Operation::new("Do", vec![IMAGE_NAME.into()]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Serialises the page, with `image` available to [`Page::image`].
    pub fn into_pdf(self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular = add_font(&mut doc, "Helvetica");
        let bold = add_font(&mut doc, "Helvetica-Bold");
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width()),
                "Height" => i64::from(image.height()),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            image.as_raw().clone(),
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                REGULAR_FONT => regular,
                BOLD_FONT => bold,
            },
            "XObject" => dictionary! {
                IMAGE_NAME => image_id,
            },
        });

        let content = Content {
            operations: self.operations,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn add_font(doc: &mut Document, base_font: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn real(value: f32) -> Object {
    value.into()
}

/// Encodes `text` for the WinAnsiEncoding fonts; unmappable characters become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(win_ansi("Chest X-Ray (v2)"), b"Chest X-Ray (v2)".to_vec());
    }

    #[test]
    fn latin1_and_typography_map_to_single_bytes() {
        assert_eq!(win_ansi("Röntgen"), vec![b'R', 0xf6, b'n', b't', b'g', b'e', b'n']);
        assert_eq!(win_ansi("“A” – B…"), vec![0x93, b'A', 0x94, b' ', 0x96, b' ', b'B', 0x85]);
    }

    #[test]
    fn unmappable_characters_become_question_marks() {
        assert_eq!(win_ansi("胸部 X"), b"?? X".to_vec());
        assert_eq!(win_ansi("tab\there"), b"tab?here".to_vec());
    }
}
