use super::layout::{FontFace, PageGeometry, Paginator, text_width, wrap_text};
use super::{AssembleError, Block, Section, SectionKind};
use crate::models::BookDocument;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat, dictionary};
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, warn};

const LEADING: f32 = 1.2;
const TEXT_SPACING: f32 = 10.0;
const IMAGE_SPACING: f32 = 20.0;
/// Body images are scaled to fit inside a square of this side.
const IMAGE_BOX: f32 = 200.0;
const COVER_ASPECT: f32 = 0.75;

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    face: FontFace,
    size: f32,
    centered: bool,
}

impl TextStyle {
    /// Resource name of the face in the shared font dictionary.
    fn font(&self) -> &'static str {
        match self.face {
            FontFace::Regular => "F1",
            FontFace::Bold => "F2",
        }
    }
}

const TITLE: TextStyle = TextStyle {
    face: FontFace::Bold,
    size: 24.0,
    centered: true,
};
const HEADING1: TextStyle = TextStyle {
    face: FontFace::Bold,
    size: 18.0,
    centered: false,
};
const HEADING2: TextStyle = TextStyle {
    face: FontFace::Bold,
    size: 14.0,
    centered: false,
};
const BODY: TextStyle = TextStyle {
    face: FontFace::Regular,
    size: 12.0,
    centered: false,
};

fn pdf_err<E: Display>(e: E) -> AssembleError {
    AssembleError::Pdf(e.to_string())
}

/// Encodes text for the standard Type1 fonts. Characters outside
/// WinAnsiEncoding become '?'.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

struct PdfWriter {
    doc: Document,
    geometry: PageGeometry,
    paginator: Paginator,
    pages: Vec<Vec<Operation>>,
    xobjects: Dictionary,
}

impl PdfWriter {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            doc: Document::with_version("1.5"),
            geometry,
            paginator: Paginator::new(geometry),
            pages: vec![Vec::new()],
            xobjects: Dictionary::new(),
        }
    }

    fn ops(&mut self, page: usize) -> &mut Vec<Operation> {
        if self.pages.len() <= page {
            self.pages.resize_with(page + 1, Vec::new);
        }
        &mut self.pages[page]
    }

    fn break_page(&mut self) {
        self.paginator.break_page();
        let page = self.paginator.page();
        self.ops(page);
    }

    /// Wraps and places a run of text. Runs taller than a page are split
    /// into page-sized chunks.
    fn text(&mut self, text: &str, style: TextStyle) {
        let line_height = style.size * LEADING;
        let lines = wrap_text(text, style.size, style.face, self.geometry.usable_width());
        if lines.is_empty() {
            return;
        }
        let per_page = ((self.geometry.usable_height() / line_height).floor() as usize).max(1);
        let chunks = lines.chunks(per_page).count();

        for (n, chunk) in lines.chunks(per_page).enumerate() {
            let spacing = if n + 1 == chunks { TEXT_SPACING } else { 0.0 };
            let placement = self
                .paginator
                .place(chunk.len() as f32 * line_height, spacing);
            let margin = self.geometry.margin;
            let usable = self.geometry.usable_width();

            let ops = self.ops(placement.page);
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![style.font().into(), style.size.into()],
            ));
            for (i, line) in chunk.iter().enumerate() {
                let x = if style.centered {
                    margin + ((usable - text_width(line, style.size, style.face)) / 2.0).max(0.0)
                } else {
                    margin
                };
                let baseline = placement.top - style.size - i as f32 * line_height;
                // Absolute position per line.
                ops.push(Operation::new(
                    "Tm",
                    vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        x.into(),
                        baseline.into(),
                    ],
                ));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
                ));
            }
            ops.push(Operation::new("ET", vec![]));
        }
    }

    fn image(&mut self, path: &Path, cover: bool) {
        let rgb = match image::open(path) {
            Ok(decoded) => decoded.to_rgb8(),
            Err(e) => {
                warn!("Cannot decode {} for the PDF ({}), leaving it out", path.display(), e);
                return;
            }
        };
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let (draw_width, draw_height) = if cover {
            let w = self.geometry.width / 2.0;
            (w, w * COVER_ASPECT)
        } else {
            let scale = (IMAGE_BOX / width as f32).min(IMAGE_BOX / height as f32);
            (width as f32 * scale, height as f32 * scale)
        };

        let mut stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb.into_raw(),
        );
        // Left uncompressed if compression fails.
        let _ = stream.compress();
        let id = self.doc.add_object(stream);
        let name = format!("Im{}", self.xobjects.len() + 1);
        self.xobjects.set(name.clone(), id);

        let placement = self.paginator.place(draw_height, IMAGE_SPACING);
        let x = self.geometry.margin + (self.geometry.usable_width() - draw_width) / 2.0;
        let y = placement.top - draw_height;
        let ops = self.ops(placement.page);
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                draw_width.into(),
                0.into(),
                0.into(),
                draw_height.into(),
                x.into(),
                y.into(),
            ],
        ));
        ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        ops.push(Operation::new("Q", vec![]));
    }

    fn section(&mut self, section: &Section) {
        let cover = section.kind == SectionKind::Cover;
        for block in &section.blocks {
            match block {
                Block::Title(text) => self.text(text, TITLE),
                Block::Heading1(text) => self.text(text, HEADING1),
                Block::Heading2(text) => self.text(text, HEADING2),
                Block::Paragraph(text) | Block::Entry(text) => self.text(text, BODY),
                Block::Image { path, .. } => self.image(path, cover),
            }
        }
    }

    fn finish(mut self, title: &str) -> Result<Document, AssembleError> {
        let font = |base: &'static str| {
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            }
        };
        let regular = self.doc.add_object(font("Helvetica"));
        let bold = self.doc.add_object(font("Helvetica-Bold"));
        let resources_id = self.doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
            "XObject" => self.xobjects.clone(),
        });

        let pages_id = self.doc.new_object_id();
        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            self.geometry.width.into(),
            self.geometry.height.into(),
        ];

        let mut kids = Vec::with_capacity(self.pages.len());
        for operations in std::mem::take(&mut self.pages) {
            let content = Content { operations }.encode().map_err(pdf_err)?;
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box.clone(),
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::String(encode_win_ansi(title), StringFormat::Literal),
            "Producer" => Object::string_literal("bookgen"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        Ok(self.doc)
    }
}

/// Lays the sections out on A4 pages. The cover gets a page of its own;
/// everything after it flows continuously.
pub fn build_pdf(doc: &BookDocument, sections: &[Section]) -> Result<Document, AssembleError> {
    let mut writer = PdfWriter::new(PageGeometry::A4);
    for (i, section) in sections.iter().enumerate() {
        writer.section(section);
        if section.kind == SectionKind::Cover && i + 1 < sections.len() {
            writer.break_page();
        }
    }
    debug!("Laid out {} PDF pages", writer.pages.len());
    writer.finish(&doc.title)
}

pub fn render_pdf(doc: &BookDocument, sections: &[Section]) -> Result<Vec<u8>, AssembleError> {
    let mut document = build_pdf(doc, sections)?;
    let mut output = Vec::new();
    document.save_to(&mut output).map_err(pdf_err)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Audience, BookParameters, ImageSize};
    use crate::services::assembler::build_sections;
    use crate::services::images::write_placeholder;
    use crate::services::normalizer::fallback_document;
    use tempfile::TempDir;

    fn page_texts(document: &Document) -> Vec<String> {
        document
            .get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&document.get_page_content(*id).unwrap()).into_owned())
            .collect()
    }

    fn image_count(document: &Document) -> usize {
        document
            .objects
            .values()
            .filter(|object| match object {
                Object::Stream(stream) => stream
                    .dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .map(|name| name == b"Image")
                    .unwrap_or(false),
                _ => false,
            })
            .count()
    }

    #[test]
    fn win_ansi_maps_common_punctuation() {
        assert_eq!(encode_win_ansi("café – “ok”"), b"caf\xe9 \x96 \x93ok\x94".to_vec());
        assert_eq!(encode_win_ansi("火山"), b"??".to_vec());
    }

    #[test]
    fn cover_stands_alone_and_text_lands_on_pages() {
        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let doc = fallback_document(&params);
        let sections = build_sections(&doc, &[]);

        let document = build_pdf(&doc, &sections).unwrap();
        let pages = page_texts(&document);
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("(Volcanoes) Tj"));
        assert!(!pages[0].contains("(Bibliography) Tj"));
        assert!(pages[1].contains("(Bibliography) Tj"));
        assert!(pages[1].contains("(1. default content for bibliography) Tj"));
    }

    #[test]
    fn long_content_flows_over_several_pages() {
        let params = BookParameters::new("Volcanoes", Audience::Adult, "30-40");
        let mut doc = fallback_document(&params);
        doc.introduction = vec!["Lava flows downhill slowly. ".repeat(40); 30].join("\n\n");
        let sections = build_sections(&doc, &[]);

        let document = build_pdf(&doc, &sections).unwrap();
        assert!(document.get_pages().len() > 4);
    }

    #[test]
    fn images_become_xobjects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter_1.png");
        write_placeholder(
            &path,
            ImageSize {
                width: 40,
                height: 20,
            },
            1,
        )
        .unwrap();

        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let doc = fallback_document(&params);
        let mut sections = build_sections(&doc, &[]);
        sections[3].blocks.push(Block::Image {
            path: path.clone(),
            alt: "chapter".to_string(),
        });
        sections[3].blocks.push(Block::Image {
            path: dir.path().join("missing.png"),
            alt: "gone".to_string(),
        });

        let document = build_pdf(&doc, &sections).unwrap();
        assert_eq!(image_count(&document), 1);
        assert!(page_texts(&document)[1].contains("/Im1 Do"));
    }

    /// Operands of every `cm` operator on a page, as floats.
    fn placements(document: &Document, page: usize) -> Vec<Vec<f32>> {
        let id = document.get_pages()[&(page as u32 + 1)];
        let content = Content::decode(&document.get_page_content(id).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "cm")
            .map(|op| op.operands.iter().map(|o| o.as_float().unwrap()).collect())
            .collect()
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 0.01, "{actual} != {expected}");
    }

    #[test]
    fn images_keep_aspect_and_cover_is_half_page() {
        let dir = TempDir::new().unwrap();
        let cover = dir.path().join("cover.png");
        let wide = dir.path().join("chapter_1.png");
        let tall = dir.path().join("chapter_2.png");
        write_placeholder(&cover, ImageSize { width: 8, height: 8 }, 0).unwrap();
        write_placeholder(&wide, ImageSize { width: 40, height: 20 }, 1).unwrap();
        write_placeholder(&tall, ImageSize { width: 10, height: 50 }, 2).unwrap();

        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let doc = fallback_document(&params);
        let mut sections = build_sections(&doc, &[]);
        sections[0].blocks.push(Block::Image {
            path: cover,
            alt: "cover".to_string(),
        });
        for path in [wide, tall] {
            sections[3].blocks.push(Block::Image {
                path,
                alt: "chapter".to_string(),
            });
        }

        let document = build_pdf(&doc, &sections).unwrap();

        // Half the page width, 3:4 regardless of the source shape.
        let cover_cm = &placements(&document, 0)[0];
        assert_close(cover_cm[0], 297.5);
        assert_close(cover_cm[3], 223.125);
        assert_close(cover_cm[4], 50.0 + (495.0 - 297.5) / 2.0);

        let body = placements(&document, 1);
        assert_eq!(body.len(), 2);
        assert_close(body[0][0], 200.0);
        assert_close(body[0][3], 100.0);
        assert_close(body[1][0], 40.0);
        assert_close(body[1][3], 200.0);
    }

    #[test]
    fn rendered_bytes_are_a_pdf() {
        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let doc = fallback_document(&params);
        let bytes = render_pdf(&doc, &build_sections(&doc, &[])).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
    }
}
