use serde::{Deserialize, Serialize};

/// Canonical book content. Every field is populated once the normalizer has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDocument {
    pub title: String,
    pub description: String,
    pub toc: Vec<TocEntry>,
    pub introduction: String,
    pub chapters: Vec<Chapter>,
    pub exercises: Exercises,
    pub conclusion: String,
    pub bibliography: Vec<String>,
    #[serde(flatten)]
    pub metadata: BookMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub label: String,
    pub page: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub title: String,
    pub description: String,
}

/// Models return exercises either as a list of entries or as one block of prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Exercises {
    Structured(Vec<Exercise>),
    FreeText(String),
}

impl Exercises {
    pub fn is_empty(&self) -> bool {
        match self {
            Exercises::Structured(list) => list.is_empty(),
            Exercises::FreeText(text) => text.trim().is_empty(),
        }
    }
}

/// Descriptive parameters carried along for EPUB metadata and the content dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_register: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,
}
