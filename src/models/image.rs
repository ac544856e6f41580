use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where in the book an image belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum ImageSlot {
    Cover,
    /// 1-based chapter number.
    Chapter(usize),
    Exercises,
    Conclusion,
}

impl ImageSlot {
    /// File name stem used for the persisted image and the EPUB resource.
    pub fn file_stem(&self) -> String {
        match self {
            ImageSlot::Cover => "cover".to_string(),
            ImageSlot::Chapter(n) => format!("chapter_{n}"),
            ImageSlot::Exercises => "exercises".to_string(),
            ImageSlot::Conclusion => "conclusion".to_string(),
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub slot: ImageSlot,
    pub prompt: String,
    /// Short human-readable caption, used as alt text.
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    #[default]
    Standard,
    Hd,
}

impl ImageQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::Hd => "hd",
        }
    }
}

impl FromStr for ImageQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(ImageQuality::Standard),
            "hd" => Ok(ImageQuality::Hd),
            other => Err(format!("unknown image quality '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width: u32 = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
        let height: u32 = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
        if width == 0 || height == 0 {
            return Err(format!("image size must be non-zero, got '{s}'"));
        }
        Ok(ImageSize { width, height })
    }
}

/// How an image file came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ImageSource {
    Generated,
    /// Solid-color image synthesized locally.
    Placeholder,
    RemotePlaceholder { url: String },
}

impl ImageSource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ImageSource::Generated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub slot: ImageSlot,
    pub path: PathBuf,
    pub prompt: String,
    pub description: String,
    pub source: ImageSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_file_stems() {
        assert_eq!(ImageSlot::Cover.file_stem(), "cover");
        assert_eq!(ImageSlot::Chapter(3).file_stem(), "chapter_3");
        assert_eq!(ImageSlot::Conclusion.to_string(), "conclusion");
    }

    #[test]
    fn image_size_parses_and_displays() {
        let size: ImageSize = "1024x768".parse().unwrap();
        assert_eq!(size, ImageSize { width: 1024, height: 768 });
        assert_eq!(size.to_string(), "1024x768");
        assert!("1024".parse::<ImageSize>().is_err());
        assert!("0x10".parse::<ImageSize>().is_err());
    }

    #[test]
    fn image_result_serializes_with_source_tag() {
        let result = ImageResult {
            slot: ImageSlot::Chapter(2),
            path: PathBuf::from("images/chapter_2.png"),
            prompt: "a volcano".to_string(),
            description: "Illustration".to_string(),
            source: ImageSource::RemotePlaceholder {
                url: "https://example.com/1.png".to_string(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["slot"]["kind"], "chapter");
        assert_eq!(json["slot"]["index"], 2);
        assert_eq!(json["source"]["type"], "remote_placeholder");
        assert!(result.source.is_fallback());
    }
}
