use super::{AssembleError, Block, Section, SectionKind, read_image};
use crate::models::BookDocument;
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::collections::HashSet;
use std::fmt::Display;
use std::fmt::Write as _;
use std::path::Path;

pub const STYLESHEET: &str = r#"body {
    font-family: "Helvetica", "Arial", sans-serif;
    margin: 5%;
    text-align: justify;
    line-height: 1.5;
}
h1 {
    text-align: center;
    font-size: 2em;
    margin-bottom: 1em;
}
h2 {
    font-size: 1.4em;
    margin-top: 1em;
    margin-bottom: 0.6em;
    color: #4a7ba7;
}
p {
    margin-bottom: 0.5em;
}
img {
    max-width: 100%;
    display: block;
    margin: 1em auto;
}
.cover {
    text-align: center;
}
.book-title {
    font-size: 2.4em;
}
.entry {
    margin-bottom: 0.5em;
    text-indent: -2em;
    padding-left: 2em;
    text-align: left;
}
"#;

fn epub_err<E: Display>(e: E) -> AssembleError {
    AssembleError::Epub(e.to_string())
}

fn reftype(kind: SectionKind) -> ReferenceType {
    match kind {
        SectionKind::Cover => ReferenceType::Cover,
        SectionKind::Toc => ReferenceType::Toc,
        SectionKind::Introduction => ReferenceType::Preface,
        SectionKind::Bibliography => ReferenceType::Bibliography,
        SectionKind::Chapter(_) | SectionKind::Exercises | SectionKind::Conclusion => {
            ReferenceType::Text
        }
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    }
}

/// Name of an image inside the package; XHTML refers to it relatively.
fn resource_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string())
}

pub fn section_xhtml(section: &Section, book_title: &str, language: &str) -> String {
    let mut body = String::new();
    for block in &section.blocks {
        // Writing to a String cannot fail.
        let _ = match block {
            Block::Title(text) => writeln!(body, r#"<h1 class="book-title">{}</h1>"#, encode_text(text)),
            Block::Heading1(text) => writeln!(body, "<h1>{}</h1>", encode_text(text)),
            Block::Heading2(text) => writeln!(body, "<h2>{}</h2>", encode_text(text)),
            Block::Paragraph(text) => writeln!(body, "<p>{}</p>", encode_text(text)),
            Block::Entry(text) => writeln!(body, r#"<p class="entry">{}</p>"#, encode_text(text)),
            Block::Image { path, alt } => writeln!(
                body,
                r#"<img src="{}" alt="{}"/>"#,
                encode_double_quoted_attribute(&resource_name(path)),
                encode_double_quoted_attribute(alt)
            ),
        };
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
<meta charset="UTF-8"/>
<title>{title} - {book}</title>
<link rel="stylesheet" type="text/css" href="stylesheet.css"/>
</head>
<body class="{class}">
{body}</body>
</html>
"#,
        lang = encode_double_quoted_attribute(language),
        title = encode_text(&section.title),
        book = encode_text(book_title),
        class = section.kind.file_stem().trim_end_matches(|c: char| c.is_ascii_digit() || c == '_'),
        body = body,
    )
}

/// Packs the sections into an EPUB 3 container: one spine item per section,
/// the stylesheet, the images and generated navigation documents.
pub fn render_epub(
    doc: &BookDocument,
    sections: &[Section],
    language: &str,
) -> Result<Vec<u8>, AssembleError> {
    let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub_err)?).map_err(epub_err)?;
    builder.epub_version(EpubVersion::V30);
    builder.metadata("title", &doc.title).map_err(epub_err)?;
    builder.metadata("lang", language).map_err(epub_err)?;
    builder.metadata("description", &doc.description).map_err(epub_err)?;
    builder.metadata("generator", "bookgen").map_err(epub_err)?;
    if let Some(topic) = &doc.metadata.topic {
        builder.metadata("subject", topic).map_err(epub_err)?;
    }
    builder.stylesheet(STYLESHEET.as_bytes()).map_err(epub_err)?;

    let mut added = HashSet::new();
    for section in sections {
        for block in &section.blocks {
            let Block::Image { path, .. } = block else {
                continue;
            };
            let name = resource_name(path);
            if !added.insert(name.clone()) {
                continue;
            }
            let bytes = read_image(path)?;
            if section.kind == SectionKind::Cover {
                builder
                    .add_cover_image(&name, bytes.as_slice(), mime_type(path))
                    .map_err(epub_err)?;
            } else {
                builder
                    .add_resource(&name, bytes.as_slice(), mime_type(path))
                    .map_err(epub_err)?;
            }
        }
    }

    for section in sections {
        let xhtml = section_xhtml(section, &doc.title, language);
        let file_name = format!("{}.xhtml", section.kind.file_stem());
        builder
            .add_content(
                EpubContent::new(file_name, xhtml.as_bytes())
                    .title(section.title.as_str())
                    .reftype(reftype(section.kind)),
            )
            .map_err(epub_err)?;
    }

    let mut output = Vec::new();
    builder.generate(&mut output).map_err(epub_err)?;
    Ok(output)
}
