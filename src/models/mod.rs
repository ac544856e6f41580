mod document;
mod image;
mod params;

pub use document::{BookDocument, BookMetadata, Chapter, Exercise, Exercises, Section, TocEntry};
pub use image::{ImageQuality, ImageRequest, ImageResult, ImageSize, ImageSlot, ImageSource};
pub use params::{Audience, BookParameters, NOT_SPECIFIED, ParameterError};
