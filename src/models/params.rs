use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rendered in prompts for optional parameters the user left blank.
pub const NOT_SPECIFIED: &str = "not specified";

#[derive(Error, Debug, PartialEq)]
pub enum ParameterError {
    #[error("Unknown audience '{0}' (expected children, young adults or adults)")]
    UnknownAudience(String),
    #[error("Required parameter '{0}' is empty")]
    Empty(&'static str),
    #[error("Invalid parameter file: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Audience {
    Children,
    YoungAdult,
    Adult,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Children => "children",
            Audience::YoungAdult => "young adults",
            Audience::Adult => "adults",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "children" | "child" | "kids" | "niños" => Ok(Audience::Children),
            "young adult" | "young adults" | "teens" | "teenagers" | "youth" | "jóvenes"
            | "jovenes" => Ok(Audience::YoungAdult),
            "adult" | "adults" | "adultos" => Ok(Audience::Adult),
            _ => Err(ParameterError::UnknownAudience(s.trim().to_string())),
        }
    }
}

impl TryFrom<String> for Audience {
    type Error = ParameterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Audience> for String {
    fn from(audience: Audience) -> Self {
        audience.as_str().to_string()
    }
}

/// Everything the user tells us about the book before generation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookParameters {
    pub title: String,
    pub audience: Audience,
    pub age_range: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub academic_level: Option<String>,
    #[serde(default)]
    pub approach: Option<String>,
    #[serde(default)]
    pub language_register: Option<String>,
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub desired_pages: Option<String>,
}

impl BookParameters {
    pub fn new(title: impl Into<String>, audience: Audience, age_range: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            audience,
            age_range: age_range.into(),
            topic: None,
            academic_level: None,
            approach: None,
            language_register: None,
            depth: None,
            desired_pages: None,
        }
    }

    /// Parses a JSON parameter file. `title`, `audience` and `age_range` are required.
    pub fn from_json(json: &str) -> Result<Self, ParameterError> {
        let params: BookParameters =
            serde_json::from_str(json).map_err(|e| ParameterError::Json(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.title.trim().is_empty() {
            return Err(ParameterError::Empty("title"));
        }
        if self.age_range.trim().is_empty() {
            return Err(ParameterError::Empty("age_range"));
        }
        Ok(())
    }

    /// Lower bound of the age range, e.g. `7` for `"7-9"`.
    pub fn min_age(&self) -> Option<u32> {
        self.age_range
            .split('-')
            .next()
            .and_then(|lower| lower.trim().parse().ok())
    }

    /// Topic of the book, falling back to the title when none was given.
    pub fn topic_or_title(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.title)
    }

    /// Values for every placeholder the prompt templates know about.
    pub fn template_values(&self) -> BTreeMap<&'static str, String> {
        let optional = |value: &Option<String>| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(NOT_SPECIFIED)
                .to_string()
        };

        BTreeMap::from([
            ("title", self.title.clone()),
            ("audience", self.audience.to_string()),
            ("age_range", self.age_range.clone()),
            ("topic", self.topic_or_title().to_string()),
            ("academic_level", optional(&self.academic_level)),
            ("approach", optional(&self.approach)),
            ("language_register", optional(&self.language_register)),
            ("depth", optional(&self.depth)),
            ("desired_pages", optional(&self.desired_pages)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_parses_loose_spellings() {
        assert_eq!("Children".parse::<Audience>(), Ok(Audience::Children));
        assert_eq!(" kids ".parse::<Audience>(), Ok(Audience::Children));
        assert_eq!("young-adult".parse::<Audience>(), Ok(Audience::YoungAdult));
        assert_eq!("Teenagers".parse::<Audience>(), Ok(Audience::YoungAdult));
        assert_eq!("adultos".parse::<Audience>(), Ok(Audience::Adult));
        assert!(matches!(
            "martians".parse::<Audience>(),
            Err(ParameterError::UnknownAudience(_))
        ));
    }

    #[test]
    fn min_age_takes_lower_bound() {
        let mut params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        assert_eq!(params.min_age(), Some(7));

        params.age_range = " 12 - 17 ".to_string();
        assert_eq!(params.min_age(), Some(12));

        params.age_range = "18".to_string();
        assert_eq!(params.min_age(), Some(18));

        params.age_range = "abc".to_string();
        assert_eq!(params.min_age(), None);
    }

    #[test]
    fn from_json_requires_core_fields() {
        let params = BookParameters::from_json(
            r#"{"title": "Volcanoes", "audience": "children", "age_range": "7-9", "topic": "geology"}"#,
        )
        .unwrap();
        assert_eq!(params.audience, Audience::Children);
        assert_eq!(params.topic.as_deref(), Some("geology"));
        assert_eq!(params.depth, None);

        let missing = BookParameters::from_json(r#"{"title": "Volcanoes", "audience": "children"}"#);
        assert!(matches!(missing, Err(ParameterError::Json(_))));

        let blank = BookParameters::from_json(
            r#"{"title": "  ", "audience": "adults", "age_range": "30-40"}"#,
        );
        assert_eq!(blank, Err(ParameterError::Empty("title")));
    }

    #[test]
    fn template_values_fill_optional_fields() {
        let mut params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        params.depth = Some("deep".to_string());

        let values = params.template_values();
        assert_eq!(values["topic"], "Volcanoes");
        assert_eq!(values["audience"], "children");
        assert_eq!(values["depth"], "deep");
        assert_eq!(values["approach"], NOT_SPECIFIED);
    }
}
