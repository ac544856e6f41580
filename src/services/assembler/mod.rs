//! Document assembly: a [`BookDocument`] plus its images become an ordered
//! list of [`Section`]s, which are rendered to EPUB or PDF and written
//! atomically to the output path.

mod epub;
pub mod layout;
mod pdf;

pub use epub::render_epub;
pub use pdf::{build_pdf, render_pdf};

use crate::models::{BookDocument, Chapter, Exercises, ImageResult, ImageSlot};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("EPUB generation failed: {0}")]
    Epub(String),
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Epub,
    Pdf,
}

impl OutputFormat {
    /// Infers the format from a file extension, if it names one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "epub" => Some(OutputFormat::Epub),
            "pdf" => Some(OutputFormat::Pdf),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Cover,
    Toc,
    Introduction,
    /// 1-based chapter number.
    Chapter(usize),
    Exercises,
    Conclusion,
    Bibliography,
}

impl SectionKind {
    pub fn file_stem(&self) -> String {
        match self {
            SectionKind::Cover => "cover".to_string(),
            SectionKind::Toc => "toc".to_string(),
            SectionKind::Introduction => "introduction".to_string(),
            SectionKind::Chapter(n) => format!("chapter_{n}"),
            SectionKind::Exercises => "exercises".to_string(),
            SectionKind::Conclusion => "conclusion".to_string(),
            SectionKind::Bibliography => "bibliography".to_string(),
        }
    }
}

/// One unit of content, styled by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading1(String),
    Heading2(String),
    Paragraph(String),
    /// A numbered line in a listing (table of contents, bibliography).
    Entry(String),
    Image { path: PathBuf, alt: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub blocks: Vec<Block>,
}

impl Section {
    fn new(kind: SectionKind, title: impl Into<String>) -> Self {
        let title = title.into();
        let blocks = match kind {
            SectionKind::Cover => Vec::new(),
            _ => vec![Block::Heading1(title.clone())],
        };
        Section { kind, title, blocks }
    }

    fn push_paragraphs(&mut self, text: &str) {
        self.blocks
            .extend(split_paragraphs(text).into_iter().map(Block::Paragraph));
    }

    fn push_images<'a>(&mut self, images: impl IntoIterator<Item = &'a ImageResult>) {
        self.blocks.extend(images.into_iter().map(image_block));
    }
}

fn image_block(image: &ImageResult) -> Block {
    Block::Image {
        path: image.path.clone(),
        alt: image.description.clone(),
    }
}

fn images_for(images: &[ImageResult], slot: ImageSlot) -> impl Iterator<Item = &ImageResult> {
    images.iter().filter(move |image| image.slot == slot)
}

/// Splits on blank lines; text without blank lines is split on single newlines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let has_blank_line = text.lines().any(|line| line.trim().is_empty());
    if !has_blank_line {
        return text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

/// Chapters with at least this many paragraphs get their images interleaved.
const INTERLEAVE_MIN_PARAGRAPHS: usize = 4;

fn chapter_section(number: usize, chapter: &Chapter, images: &[ImageResult]) -> Section {
    let mut section = Section::new(SectionKind::Chapter(number), chapter.title.clone());
    let mut pending = images_for(images, ImageSlot::Chapter(number));
    let paragraphs = split_paragraphs(&chapter.content);
    let interleave = paragraphs.len() >= INTERLEAVE_MIN_PARAGRAPHS;

    for (i, paragraph) in paragraphs.into_iter().enumerate() {
        section.blocks.push(Block::Paragraph(paragraph));
        if interleave && (i + 1) % 2 == 0 {
            if let Some(image) = pending.next() {
                section.blocks.push(image_block(image));
            }
        }
    }

    for sub in &chapter.sections {
        if !sub.title.is_empty() {
            section.blocks.push(Block::Heading2(sub.title.clone()));
        }
        section.push_paragraphs(&sub.content);
    }

    section.push_images(pending);
    section
}

/// Lays the book out in reading order: cover, table of contents,
/// introduction, chapters, exercises, conclusion, bibliography.
pub fn build_sections(doc: &BookDocument, images: &[ImageResult]) -> Vec<Section> {
    let mut sections = Vec::with_capacity(doc.chapters.len() + 6);

    let mut cover = Section::new(SectionKind::Cover, "Cover");
    cover.blocks.push(Block::Title(doc.title.clone()));
    cover.push_paragraphs(&doc.description);
    cover.push_images(images_for(images, ImageSlot::Cover));
    sections.push(cover);

    let mut toc = Section::new(SectionKind::Toc, "Table of Contents");
    toc.blocks.extend(doc.toc.iter().enumerate().map(|(i, entry)| {
        if entry.page.is_empty() {
            Block::Entry(format!("{}. {}", i + 1, entry.label))
        } else {
            Block::Entry(format!("{}. {} - {}", i + 1, entry.label, entry.page))
        }
    }));
    sections.push(toc);

    let mut introduction = Section::new(SectionKind::Introduction, "Introduction");
    introduction.push_paragraphs(&doc.introduction);
    sections.push(introduction);

    for (i, chapter) in doc.chapters.iter().enumerate() {
        sections.push(chapter_section(i + 1, chapter, images));
    }

    let mut exercises = Section::new(SectionKind::Exercises, "Exercises");
    match &doc.exercises {
        Exercises::Structured(list) => {
            for (i, exercise) in list.iter().enumerate() {
                exercises
                    .blocks
                    .push(Block::Heading2(format!("Exercise {}: {}", i + 1, exercise.title)));
                exercises.push_paragraphs(&exercise.description);
            }
        }
        Exercises::FreeText(text) => exercises.push_paragraphs(text),
    }
    exercises.push_images(images_for(images, ImageSlot::Exercises));
    sections.push(exercises);

    let mut conclusion = Section::new(SectionKind::Conclusion, "Conclusion");
    conclusion.push_paragraphs(&doc.conclusion);
    conclusion.push_images(images_for(images, ImageSlot::Conclusion));
    sections.push(conclusion);

    let mut bibliography = Section::new(SectionKind::Bibliography, "Bibliography");
    bibliography.blocks.extend(
        doc.bibliography
            .iter()
            .enumerate()
            .map(|(i, reference)| Block::Entry(format!("{}. {}", i + 1, reference))),
    );
    sections.push(bibliography);

    sections
}

/// Renders the book and writes it to `output`. Images whose files are missing
/// are left out.
pub fn assemble(
    doc: &BookDocument,
    images: &[ImageResult],
    output: &Path,
    format: OutputFormat,
    language: &str,
) -> Result<PathBuf, AssembleError> {
    let available: Vec<ImageResult> = images
        .iter()
        .filter(|image| {
            let exists = image.path.is_file();
            if !exists {
                warn!("Image {} not found, leaving it out", image.path.display());
            }
            exists
        })
        .cloned()
        .collect();

    let sections = build_sections(doc, &available);
    info!("Assembling {} sections as {}", sections.len(), format.extension());

    let bytes = match format {
        OutputFormat::Epub => render_epub(doc, &sections, language)?,
        OutputFormat::Pdf => render_pdf(doc, &sections)?,
    };

    write_atomically(output, &bytes)?;
    info!("Wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(output.to_path_buf())
}

/// Writes through a temporary file in the target directory so a failed run
/// never leaves a truncated artifact behind.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), AssembleError> {
    let io_err = |source| AssembleError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

pub(crate) fn read_image(path: &Path) -> Result<Vec<u8>, AssembleError> {
    fs::read(path).map_err(|source| AssembleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Audience, BookParameters, Exercise, ImageSource, Section as SubSection};
    use crate::services::normalizer::fallback_document;
    use tempfile::TempDir;

    fn document() -> BookDocument {
        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let mut doc = fallback_document(&params);
        doc.chapters = vec![
            Chapter {
                title: "Magma".to_string(),
                content: "One.\n\nTwo.\n\nThree.".to_string(),
                sections: Vec::new(),
            },
            Chapter {
                title: "Lava".to_string(),
                content: "A.\n\nB.\n\nC.\n\nD.\n\nE.".to_string(),
                sections: vec![SubSection {
                    title: "Flows".to_string(),
                    content: "Slow.".to_string(),
                }],
            },
        ];
        doc
    }

    fn image(slot: ImageSlot, name: &str) -> ImageResult {
        ImageResult {
            slot,
            path: PathBuf::from(name),
            prompt: String::new(),
            description: format!("alt {name}"),
            source: ImageSource::Placeholder,
        }
    }

    fn kinds(sections: &[Section]) -> Vec<SectionKind> {
        sections.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn sections_follow_reading_order() {
        let sections = build_sections(&document(), &[]);
        assert_eq!(
            kinds(&sections),
            vec![
                SectionKind::Cover,
                SectionKind::Toc,
                SectionKind::Introduction,
                SectionKind::Chapter(1),
                SectionKind::Chapter(2),
                SectionKind::Exercises,
                SectionKind::Conclusion,
                SectionKind::Bibliography,
            ]
        );
        assert_eq!(sections[0].blocks[0], Block::Title("Volcanoes".to_string()));
        assert!(
            sections[1..]
                .iter()
                .all(|s| s.blocks[0] == Block::Heading1(s.title.clone()))
        );
    }

    #[test]
    fn defaulted_document_keeps_every_section() {
        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let sections = build_sections(&fallback_document(&params), &[]);
        assert_eq!(sections.len(), 7);
        let bibliography = sections.last().unwrap();
        assert_eq!(
            bibliography.blocks[1],
            Block::Entry("1. default content for bibliography".to_string())
        );
    }

    #[test]
    fn short_chapters_get_images_at_the_end() {
        let images = [image(ImageSlot::Chapter(1), "c1.png")];
        let sections = build_sections(&document(), &images);
        let blocks = &sections[3].blocks;

        assert_eq!(blocks.len(), 5);
        assert!(matches!(blocks[4], Block::Image { .. }));
    }

    #[test]
    fn long_chapters_interleave_images_every_second_paragraph() {
        let images = [
            image(ImageSlot::Chapter(2), "a.png"),
            image(ImageSlot::Chapter(2), "b.png"),
            image(ImageSlot::Chapter(2), "c.png"),
        ];
        let sections = build_sections(&document(), &images);
        let blocks = &sections[4].blocks;

        let layout: Vec<String> = blocks
            .iter()
            .map(|b| match b {
                Block::Heading1(_) => "h1".to_string(),
                Block::Heading2(_) => "h2".to_string(),
                Block::Paragraph(p) => p.clone(),
                Block::Image { path, .. } => path.display().to_string(),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(
            layout,
            vec!["h1", "A.", "B.", "a.png", "C.", "D.", "b.png", "E.", "h2", "Slow.", "c.png"]
        );
    }

    #[test]
    fn exercises_accept_both_shapes() {
        let mut doc = document();
        doc.exercises = Exercises::Structured(vec![Exercise {
            title: "Map it".to_string(),
            description: "Find volcanoes.".to_string(),
        }]);
        let sections = build_sections(&doc, &[]);
        assert_eq!(
            sections[5].blocks[1..],
            [
                Block::Heading2("Exercise 1: Map it".to_string()),
                Block::Paragraph("Find volcanoes.".to_string())
            ]
        );

        doc.exercises = Exercises::FreeText("First task.\n\nSecond task.".to_string());
        let sections = build_sections(&doc, &[]);
        assert_eq!(sections[5].blocks.len(), 3);
    }

    #[test]
    fn back_matter_images_are_placed() {
        let images = [
            image(ImageSlot::Cover, "cover.png"),
            image(ImageSlot::Exercises, "ex.png"),
            image(ImageSlot::Conclusion, "end.png"),
        ];
        let sections = build_sections(&document(), &images);
        assert!(matches!(sections[0].blocks.last(), Some(Block::Image { .. })));
        assert!(matches!(sections[5].blocks.last(), Some(Block::Image { .. })));
        assert!(matches!(sections[6].blocks.last(), Some(Block::Image { .. })));
    }

    #[test]
    fn paragraphs_split_on_blank_or_single_lines() {
        assert_eq!(
            split_paragraphs("a\nb\n\n  \nc"),
            vec!["a b".to_string(), "c".to_string()]
        );
        assert_eq!(split_paragraphs("a\nb"), vec!["a".to_string(), "b".to_string()]);
        assert!(split_paragraphs("").is_empty());
    }

    #[test]
    fn format_is_inferred_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a/b.PDF")), Some(OutputFormat::Pdf));
        assert_eq!(OutputFormat::from_path(Path::new("book.epub")), Some(OutputFormat::Epub));
        assert_eq!(OutputFormat::from_path(Path::new("book")), None);
    }

    #[test]
    fn atomic_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/out/book.bin");
        write_atomically(&target, b"content").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"content");
        // Only the final file remains in the directory.
        assert_eq!(fs::read_dir(target.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn unwritable_output_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let result = assemble(
            &document(),
            &[],
            &blocker.join("book.epub"),
            OutputFormat::Epub,
            "en",
        );
        assert!(matches!(result, Err(AssembleError::Io { .. })));
    }

    #[test]
    fn missing_image_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.pdf");
        let images = [image(ImageSlot::Cover, "/definitely/missing.png")];

        let written = assemble(&document(), &images, &output, OutputFormat::Pdf, "en").unwrap();
        assert_eq!(written, output);
        assert!(fs::read(&output).unwrap().starts_with(b"%PDF"));
    }
}
