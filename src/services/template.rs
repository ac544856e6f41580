use crate::models::BookParameters;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("Template placeholder '{{{name}}}' has no value")]
    MissingParameter { name: String },
}

pub const BOOK_SYSTEM_PROMPT: &str =
    "You are an expert author of detailed, professional educational books.";

pub const BOOK_PROMPT_TEMPLATE: &str = r#"You are an educational book generator. Write a book titled '{title}' for {audience}, ages {age_range}, of roughly {desired_pages} pages.
Main topic: {topic}
Academic level: {academic_level}
Approach: {approach}
Language register: {language_register}
Depth: {depth}

Include an introduction, several chapters, review exercises and a bibliography.

The book must be informative, engaging and suitable for the age of its readers.
Use accurate facts, clear examples and language that fits the age range.

Structure the book as follows:
1. Cover with title and short description
2. Detailed table of contents
3. Introduction (1 page)
4. Content split into chapters (80% of the pages)
5. Interactive review exercises (10% of the pages)
6. Conclusion (1 page)
7. Bibliography and further resources (1 page)

Separate paragraphs inside chapter content with a blank line.

Return the content as JSON with this structure:
{{
  "title": "Book title",
  "description": "Short description",
  "topic": "Main topic",
  "audience": "Target audience",
  "age_range": "Age range",
  "academic_level": "Academic level",
  "approach": "Approach",
  "language_register": "Language register",
  "depth": "Depth",
  "toc": {{"Chapter 1": "page 3", ...}},
  "introduction": "Introduction text...",
  "chapters": [
    {{"title": "Chapter 1 title", "content": "Chapter 1 content...", "sections": [{{"title": "Section title", "content": "Section content..."}}]}},
    ...
  ],
  "exercises": [
    {{"title": "Exercise 1", "description": "Exercise 1 description..."}},
    ...
  ],
  "conclusion": "Conclusion text...",
  "bibliography": ["Reference 1", "Reference 2", ...]
}}
"#;

pub const IMAGE_PROMPT_TEMPLATE: &str = "Create a detailed illustration for an educational book titled '{title}' for {audience} aged {age_range}.
The image must show: {description}
Topic: {topic}
Academic level: {academic_level}
Approach: {approach}
Style: suited to the target audience, colorful, educational and visually appealing.";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern"));

/// Substitutes every `{name}` in `template`. `{{` and `}}` produce literal braces.
pub fn render<V: AsRef<str>>(
    template: &str,
    values: &BTreeMap<&str, V>,
) -> Result<String, TemplateError> {
    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| match caps.get(1) {
        Some(name) => match values.get(name.as_str()) {
            Some(value) => value.as_ref().to_string(),
            None => {
                missing.get_or_insert_with(|| name.as_str().to_string());
                String::new()
            }
        },
        None if &caps[0] == "{{" => "{".to_string(),
        None => "}".to_string(),
    });

    match missing {
        Some(name) => Err(TemplateError::MissingParameter { name }),
        None => Ok(rendered.into_owned()),
    }
}

/// The user-turn instruction sent to the text service.
pub fn book_prompt(params: &BookParameters) -> Result<String, TemplateError> {
    render(BOOK_PROMPT_TEMPLATE, &params.template_values())
}
