use crate::config::Config;
use crate::models::{BookParameters, ParameterError};
use crate::services::assembler::{self, AssembleError, OutputFormat};
use crate::services::image_plan::build_plan;
use crate::services::images::{AcquisitionError, acquire_images};
use crate::services::llm::{Downloader, ImageService, TextService, generate_content};
use crate::services::normalizer::normalize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid book parameters: {0}")]
    Parameters(#[from] ParameterError),
    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Explicit output path; defaults to the slugified title in the working directory.
    pub output: Option<PathBuf>,
    /// Defaults to the output extension, then EPUB.
    pub format: Option<OutputFormat>,
    /// Write `book_content.json` and `images_info.json` next to the output.
    pub keep_intermediate: bool,
}

impl GenerateOptions {
    fn resolve(&self, title: &str) -> (PathBuf, OutputFormat) {
        let format = self
            .format
            .or_else(|| self.output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Epub);
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_output_name(title, format)));
        (output, format)
    }
}

/// File name derived from the title: lower-case, spaces to underscores,
/// `:?!¿¡` dropped.
pub fn default_output_name(title: &str, format: OutputFormat) -> String {
    let stem: String = title
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ':' | '?' | '!' | '¿' | '¡'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    let stem = if stem.is_empty() { "book" } else { stem.as_str() };
    format!("{}.{}", stem, format.extension())
}

fn write_intermediate<T: Serialize + ?Sized>(path: &Path, value: &T) {
    let written = serde_json::to_string_pretty(value)
        .map_err(std::io::Error::other)
        .and_then(|json| std::fs::write(path, json));
    match written {
        Ok(()) => info!("Saved {}", path.display()),
        Err(e) => warn!("Cannot save {} ({})", path.display(), e),
    }
}

/// Runs the whole generation: content, normalization, image plan, image
/// acquisition and assembly. Returns the path of the written book.
pub async fn generate_book<T, I, D>(
    text: &T,
    images: &I,
    downloader: &D,
    params: &BookParameters,
    options: &GenerateOptions,
    config: &Config,
) -> Result<PathBuf, PipelineError>
where
    T: TextService,
    I: ImageService,
    D: Downloader,
{
    let span = info_span!("generate", run = %Uuid::new_v4());
    run(text, images, downloader, params, options, config)
        .instrument(span)
        .await
}

async fn run<T, I, D>(
    text: &T,
    images: &I,
    downloader: &D,
    params: &BookParameters,
    options: &GenerateOptions,
    config: &Config,
) -> Result<PathBuf, PipelineError>
where
    T: TextService,
    I: ImageService,
    D: Downloader,
{
    params.validate()?;
    let (output, format) = options.resolve(&params.title);
    let output_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&output_dir).map_err(|source| PipelineError::OutputDir {
        path: output_dir.clone(),
        source,
    })?;

    info!("Generating content for '{}'", params.title);
    let raw = match generate_content(text, params, &config.text_model).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Content generation failed ({}), using default content", e);
            String::new()
        }
    };

    let document = normalize(&raw, params);
    info!(
        "Book has {} chapters and {} references",
        document.chapters.len(),
        document.bibliography.len()
    );
    if options.keep_intermediate {
        write_intermediate(&output_dir.join("book_content.json"), &document);
    }

    let plan = build_plan(&document, params);
    info!("Planned {} images", plan.len());
    let results = acquire_images(
        images,
        downloader,
        &plan,
        &config.image,
        &output_dir.join("images"),
    )
    .await?;
    if options.keep_intermediate {
        write_intermediate(&output_dir.join("images_info.json"), &results);
    }

    let written = assembler::assemble(&document, &results, &output, format, &config.language)?;
    info!("Book ready: {}", written.display());
    Ok(written)
}
