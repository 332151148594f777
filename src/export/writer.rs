use chrono::Local;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::layout::{PageSize, Rect};
use crate::error::{ExpenseError, Result};

const FONT_NAME: &str = "F1";

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn pdf_err(e: impl std::fmt::Display) -> ExpenseError {
    ExpenseError::PdfGeneration(e.to_string())
}

/// Encode text for the standard Helvetica font (WinAnsiEncoding); unmapped characters become `?`
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
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
            _ => b'?',
        })
        .collect()
}

/// Info dictionary text string: literal for ASCII, UTF-16BE with BOM otherwise
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Descriptive document properties, invisible on the pages
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
}

/// Drawing operations and image resources of one page
pub struct PageContent {
    size: PageSize,
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

impl PageContent {
    pub fn new(size: PageSize) -> Self {
        Self {
            size,
            operations: Vec::new(),
            xobjects: Dictionary::new(),
        }
    }

    pub fn draw_image(&mut self, image: ObjectId, rect: Rect) {
        let name = format!("Im{}", self.xobjects.len() + 1);
        self.xobjects.set(name.clone(), Object::Reference(image));

        let y = self.size.height - rect.y - rect.height;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(rect.width),
                    real(0.0),
                    real(0.0),
                    real(rect.height),
                    real(rect.x),
                    real(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Single line of text; `baseline` is measured from the top edge, `gray` 0.0 is black
    pub fn draw_text(&mut self, text: &str, x: f64, baseline: f64, font_size: f64, gray: f64) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(FONT_NAME.into()), real(font_size)]),
            Operation::new("g", vec![real(gray)]),
            Operation::new("Td", vec![real(x), real(self.size.height - baseline)]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }
}

/// Builds the output PDF page by page
pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        Self {
            doc,
            pages_id,
            font_id,
            page_ids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Embed JPEG data as-is (DCTDecode)
    pub fn embed_jpeg(&mut self, jpeg: &[u8], width: u32, height: u32) -> ObjectId {
        let mut stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(width)),
                "Height" => Object::Integer(i64::from(height)),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            },
            jpeg.to_vec(),
        );
        stream.allows_compression = false;
        self.doc.add_object(stream)
    }

    /// Embed an image losslessly, keeping transparency as a soft mask
    pub fn embed_image(&mut self, image: &DynamicImage) -> ObjectId {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut color = Vec::with_capacity(rgba.len() / 4 * 3);
        let mut alpha = Vec::with_capacity(rgba.len() / 4);
        for pixel in rgba.pixels() {
            color.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let image_dict = |color_space: &str| {
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(width)),
                "Height" => Object::Integer(i64::from(height)),
                "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
                "BitsPerComponent" => Object::Integer(8),
            }
        };

        // Both streams are flate-compressed with the rest of the document in `finish`
        let mask_id = self.doc.add_object(Stream::new(image_dict("DeviceGray"), alpha));

        let mut dict = image_dict("DeviceRGB");
        dict.set("SMask", Object::Reference(mask_id));
        self.doc.add_object(Stream::new(dict, color))
    }

    pub fn add_page(&mut self, page: PageContent) -> Result<()> {
        let content = Content {
            operations: page.operations,
        }
        .encode()
        .map_err(pdf_err)?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let resources = dictionary! {
            "Font" => dictionary! { FONT_NAME => self.font_id },
            "XObject" => page.xobjects,
        };
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(page.size.width), real(page.size.height)],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    pub fn set_info(&mut self, info: &DocumentInfo) {
        let now = Local::now().format("D:%Y%m%d%H%M%S").to_string();
        let info_id = self.doc.add_object(dictionary! {
            "Title" => text_string(&info.title),
            "Author" => text_string(&info.author),
            "Subject" => text_string(&info.subject),
            "Keywords" => text_string(&info.keywords.join(", ")),
            "Creator" => Object::string_literal("reisekosten"),
            "Producer" => Object::string_literal(concat!("reisekosten ", env!("CARGO_PKG_VERSION"))),
            "CreationDate" => Object::string_literal(now),
        });
        self.doc.trailer.set("Info", Object::Reference(info_id));
    }

    /// Serialize the document
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count),
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.compress();

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).map_err(pdf_err)?;
        Ok(bytes)
    }
}
