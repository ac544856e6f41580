//! Turns whatever the text service returned into a complete [`BookDocument`].
//!
//! This is where content problems stop: a payload that is not JSON yields a
//! fully defaulted book, and a payload with missing or empty fields gets each
//! of those fields replaced independently. Nothing here returns an error.
//!
//! The accepted shapes are deliberately loose because models drift from the
//! requested schema: text fields may arrive wrapped in single-key objects,
//! exercises may be a list or a paragraph, and the table of contents may be a
//! map or a list.

use crate::models::{
    BookDocument, BookMetadata, BookParameters, Chapter, Exercise, Exercises, Section, TocEntry,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_CHAPTER_TITLE: &str = "Default Chapter";
pub const DEFAULT_EXERCISE_TITLE: &str = "Default Exercise";

/// Label used for any field the response did not provide.
pub fn default_for(field: &str) -> String {
    format!("default content for {field}")
}

#[derive(Debug, Default, Deserialize)]
struct RawBook {
    title: Option<Value>,
    description: Option<Value>,
    toc: Option<Value>,
    introduction: Option<Value>,
    chapters: Option<Value>,
    exercises: Option<Value>,
    conclusion: Option<Value>,
    bibliography: Option<Value>,
    topic: Option<Value>,
    audience: Option<Value>,
    age_range: Option<Value>,
    academic_level: Option<Value>,
    approach: Option<Value>,
    language_register: Option<Value>,
    depth: Option<Value>,
}

pub fn normalize(raw: &str, params: &BookParameters) -> BookDocument {
    let payload = strip_code_fence(raw);
    debug!("Normalizing {} bytes of generated content", payload.len());

    match serde_json::from_str::<RawBook>(payload) {
        Ok(book) => from_raw(book, params),
        Err(e) => {
            warn!("Generated content is not valid book JSON ({}), using default content", e);
            fallback_document(params)
        }
    }
}

/// Book used when the response could not be decoded at all.
pub fn fallback_document(params: &BookParameters) -> BookDocument {
    let chapters = default_chapters();
    BookDocument {
        title: params.title.clone(),
        description: format!(
            "A book about {} for {} aged {}.",
            params.topic_or_title(),
            params.audience,
            params.age_range
        ),
        toc: toc_from_chapters(&chapters),
        introduction: default_for("introduction"),
        chapters,
        exercises: default_exercises(),
        conclusion: default_for("conclusion"),
        bibliography: default_bibliography(),
        metadata: metadata_from_params(params),
    }
}

fn from_raw(raw: RawBook, params: &BookParameters) -> BookDocument {
    let chapters = raw
        .chapters
        .as_ref()
        .map(chapters_from)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| {
            warn!("Generated content has no chapters, using a default chapter");
            default_chapters()
        });

    let toc = raw
        .toc
        .as_ref()
        .map(toc_from)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| toc_from_chapters(&chapters));

    let exercises = raw
        .exercises
        .as_ref()
        .and_then(exercises_from)
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| {
            warn!("Generated content has no exercises, using a default exercise");
            default_exercises()
        });

    let bibliography = raw
        .bibliography
        .as_ref()
        .map(bibliography_from)
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| {
            warn!("Generated content has no bibliography, using a default reference");
            default_bibliography()
        });

    let fallback = metadata_from_params(params);
    let metadata = BookMetadata {
        topic: raw.topic.as_ref().and_then(flatten_text).or(fallback.topic),
        audience: raw.audience.as_ref().and_then(flatten_text).or(fallback.audience),
        age_range: raw.age_range.as_ref().and_then(flatten_text).or(fallback.age_range),
        academic_level: raw
            .academic_level
            .as_ref()
            .and_then(flatten_text)
            .or(fallback.academic_level),
        approach: raw.approach.as_ref().and_then(flatten_text).or(fallback.approach),
        language_register: raw
            .language_register
            .as_ref()
            .and_then(flatten_text)
            .or(fallback.language_register),
        depth: raw.depth.as_ref().and_then(flatten_text).or(fallback.depth),
    };

    BookDocument {
        title: text_or_default(raw.title.as_ref(), "title"),
        description: text_or_default(raw.description.as_ref(), "description"),
        toc,
        introduction: text_or_default(raw.introduction.as_ref(), "introduction"),
        chapters,
        exercises,
        conclusion: text_or_default(raw.conclusion.as_ref(), "conclusion"),
        bibliography,
        metadata,
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn text_or_default(value: Option<&Value>, field: &str) -> String {
    value.and_then(flatten_text).unwrap_or_else(|| {
        warn!("Generated content is missing '{}', using default text", field);
        default_for(field)
    })
}

/// Extracts the text payload of a value, unwrapping single-key objects such as
/// `{"content": "..."}`. Returns `None` for null or blank values.
pub fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        Value::Array(items) => join_parts(items.iter().filter_map(flatten_text)),
        Value::Object(map) => {
            if map.len() == 1 {
                return map.values().next().and_then(flatten_text);
            }
            for key in ["content", "text", "description", "body"] {
                if let Some(text) = map.get(key).and_then(flatten_text) {
                    return Some(text);
                }
            }
            join_parts(map.values().filter_map(flatten_text))
        }
    }
}

fn join_parts(parts: impl Iterator<Item = String>) -> Option<String> {
    let joined = parts.collect::<Vec<_>>().join("\n\n");
    (!joined.is_empty()).then_some(joined)
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object().and_then(|map| map.get(key))
}

fn chapters_from(value: &Value) -> Vec<Chapter> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| chapter_from(i + 1, item))
            .collect(),
        Value::Object(map) => map
            .iter()
            .enumerate()
            .map(|(i, (title, content))| Chapter {
                title: non_blank(title).unwrap_or_else(|| format!("Chapter {}", i + 1)),
                content: flatten_text(content).unwrap_or_else(|| default_for("content")),
                sections: Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn chapter_from(number: usize, item: &Value) -> Chapter {
    if item.is_object() {
        let sections = match field(item, "sections") {
            Some(Value::Array(sections)) => sections.iter().filter_map(section_from).collect(),
            _ => Vec::new(),
        };
        Chapter {
            title: field(item, "title")
                .and_then(flatten_text)
                .unwrap_or_else(|| format!("Chapter {number}")),
            content: field(item, "content")
                .and_then(flatten_text)
                .unwrap_or_else(|| default_for("content")),
            sections,
        }
    } else {
        Chapter {
            title: format!("Chapter {number}"),
            content: flatten_text(item).unwrap_or_else(|| default_for("content")),
            sections: Vec::new(),
        }
    }
}

fn section_from(item: &Value) -> Option<Section> {
    let title = field(item, "title").and_then(flatten_text);
    let content = field(item, "content").and_then(flatten_text);
    if title.is_none() && content.is_none() {
        return None;
    }
    Some(Section {
        title: title.unwrap_or_default(),
        content: content.unwrap_or_else(|| default_for("content")),
    })
}

fn toc_from(value: &Value) -> Vec<TocEntry> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(label, page)| {
                Some(TocEntry {
                    label: non_blank(label)?,
                    page: flatten_text(page).unwrap_or_default(),
                })
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => {
                    let label = field(item, "label")
                        .or_else(|| field(item, "title"))
                        .and_then(flatten_text)?;
                    let page = field(item, "page").and_then(flatten_text).unwrap_or_default();
                    Some(TocEntry { label, page })
                }
                other => flatten_text(other).map(|label| TocEntry {
                    label,
                    page: String::new(),
                }),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Map keys get the same trimming as text values.
fn non_blank(key: &str) -> Option<String> {
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_string())
}

fn toc_from_chapters(chapters: &[Chapter]) -> Vec<TocEntry> {
    chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| TocEntry {
            label: chapter.title.clone(),
            page: format!("page {}", i + 3),
        })
        .collect()
}

fn exercises_from(value: &Value) -> Option<Exercises> {
    match value {
        Value::Array(items) => Some(Exercises::Structured(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| exercise_from(i + 1, item))
                .collect(),
        )),
        other => flatten_text(other).map(Exercises::FreeText),
    }
}

fn exercise_from(number: usize, item: &Value) -> Option<Exercise> {
    if !item.is_object() {
        return flatten_text(item).map(|description| Exercise {
            title: format!("Exercise {number}"),
            description,
        });
    }
    let title = field(item, "title").and_then(flatten_text);
    let description = field(item, "description")
        .or_else(|| field(item, "content"))
        .and_then(flatten_text);
    if title.is_none() && description.is_none() {
        return None;
    }
    Some(Exercise {
        title: title.unwrap_or_else(|| format!("Exercise {number}")),
        description: description.unwrap_or_else(|| default_for("description")),
    })
}

fn bibliography_from(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(flatten_text).collect(),
        Value::String(s) => s
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        other => flatten_text(other).into_iter().collect(),
    }
}

fn default_chapters() -> Vec<Chapter> {
    vec![Chapter {
        title: DEFAULT_CHAPTER_TITLE.to_string(),
        content: default_for("chapters"),
        sections: Vec::new(),
    }]
}

fn default_exercises() -> Exercises {
    Exercises::Structured(vec![Exercise {
        title: DEFAULT_EXERCISE_TITLE.to_string(),
        description: default_for("exercises"),
    }])
}

fn default_bibliography() -> Vec<String> {
    vec![default_for("bibliography")]
}

fn metadata_from_params(params: &BookParameters) -> BookMetadata {
    BookMetadata {
        topic: params.topic.clone(),
        audience: Some(params.audience.to_string()),
        age_range: Some(params.age_range.clone()),
        academic_level: params.academic_level.clone(),
        approach: params.approach.clone(),
        language_register: params.language_register.clone(),
        depth: params.depth.clone(),
    }
}
