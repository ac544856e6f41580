//! Image acquisition: turns an image plan into PNG files on disk.
//!
//! Every request yields exactly one [`ImageResult`]. A failed generation is
//! replaced by a solid-color placeholder; an image service that fails its
//! preflight check is skipped entirely in favour of a small pool of remote
//! placeholder images.

use crate::config::ImageSettings;
use crate::models::{ImageQuality, ImageRequest, ImageResult, ImageSize, ImageSlot, ImageSource};
use crate::services::llm::{Downloader, ImageGenerationRequest, ImageService, ServiceError};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

pub const PLACEHOLDER_URLS: [&str; 5] = [
    "https://via.placeholder.com/800x600.png?text=Educational+Image+1",
    "https://via.placeholder.com/800x600.png?text=Educational+Image+2",
    "https://via.placeholder.com/800x600.png?text=Educational+Image+3",
    "https://via.placeholder.com/800x600.png?text=Educational+Image+4",
    "https://via.placeholder.com/800x600.png?text=Educational+Image+5",
];

const PALETTE: [[u8; 3]; 5] = [
    [74, 123, 167],
    [231, 111, 81],
    [42, 157, 143],
    [233, 196, 106],
    [131, 56, 236],
];

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Cannot create image directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
enum ImageFailure {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub fn image_path(images_dir: &Path, slot: ImageSlot) -> PathBuf {
    images_dir.join(format!("{}.png", slot.file_stem()))
}

/// Runs every request against `service`, falling back per request, and
/// returns one result per request in the same order.
pub async fn acquire_images<S, D>(
    service: &S,
    downloader: &D,
    requests: &[ImageRequest],
    settings: &ImageSettings,
    images_dir: &Path,
) -> Result<Vec<ImageResult>, AcquisitionError>
where
    S: ImageService,
    D: Downloader,
{
    std::fs::create_dir_all(images_dir).map_err(|source| AcquisitionError::CreateDir {
        path: images_dir.to_path_buf(),
        source,
    })?;

    if let Err(e) = service.ensure_available().await {
        warn!("Image service unavailable ({}), using remote placeholder images", e);
        return Ok(remote_placeholders(downloader, requests, settings, images_dir).await);
    }

    let mut results = Vec::with_capacity(requests.len());
    for (i, request) in requests.iter().enumerate() {
        if i > 0 && !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }

        info!("Generating image {}/{} ({})", i + 1, requests.len(), request.slot);
        let path = image_path(images_dir, request.slot);
        let source = match generate_one(service, request, settings, &path).await {
            Ok(()) => ImageSource::Generated,
            Err(e) => {
                warn!("Image {} failed ({}), using a placeholder", request.slot, e);
                write_placeholder_logged(&path, settings.size, i);
                ImageSource::Placeholder
            }
        };

        results.push(ImageResult {
            slot: request.slot,
            path,
            prompt: request.prompt.clone(),
            description: request.description.clone(),
            source,
        });
    }

    let generated = results.iter().filter(|r| !r.source.is_fallback()).count();
    info!("Generated {} of {} images", generated, results.len());
    Ok(results)
}

async fn generate_one<S: ImageService>(
    service: &S,
    request: &ImageRequest,
    settings: &ImageSettings,
    path: &Path,
) -> Result<(), ImageFailure> {
    let quality = match request.slot {
        ImageSlot::Cover => ImageQuality::Hd,
        _ => settings.quality,
    };
    let bytes = service
        .generate(ImageGenerationRequest {
            model: settings.model.clone(),
            prompt: request.prompt.clone(),
            size: settings.size,
            quality,
        })
        .await?;
    save_as_png(&bytes, path)
}

async fn remote_placeholders<D: Downloader>(
    downloader: &D,
    requests: &[ImageRequest],
    settings: &ImageSettings,
    images_dir: &Path,
) -> Vec<ImageResult> {
    let mut results = Vec::with_capacity(requests.len());
    for (i, request) in requests.iter().enumerate() {
        let url = PLACEHOLDER_URLS[i % PLACEHOLDER_URLS.len()];
        let path = image_path(images_dir, request.slot);

        let downloaded = match downloader.fetch(url).await {
            Ok(bytes) => save_as_png(&bytes, &path),
            Err(e) => Err(e.into()),
        };
        let source = match downloaded {
            Ok(()) => ImageSource::RemotePlaceholder {
                url: url.to_string(),
            },
            Err(e) => {
                warn!("Placeholder download for {} failed ({})", request.slot, e);
                write_placeholder_logged(&path, settings.size, i);
                ImageSource::Placeholder
            }
        };

        results.push(ImageResult {
            slot: request.slot,
            path,
            prompt: request.prompt.clone(),
            description: request.description.clone(),
            source,
        });
    }
    results
}

fn save_as_png(bytes: &[u8], path: &Path) -> Result<(), ImageFailure> {
    let decoded = image::load_from_memory(bytes)?;
    decoded.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Writes a solid-color PNG; the color is picked from a fixed palette by position.
pub fn write_placeholder(path: &Path, size: ImageSize, index: usize) -> Result<(), image::ImageError> {
    let color = Rgb(PALETTE[index % PALETTE.len()]);
    RgbImage::from_pixel(size.width, size.height, color).save_with_format(path, ImageFormat::Png)
}

fn write_placeholder_logged(path: &Path, size: ImageSize, index: usize) {
    // The result still references the path; the assembler skips missing files.
    if let Err(e) = write_placeholder(path, size, index) {
        error!("Cannot write placeholder image {}: {}", path.display(), e);
    }
}
