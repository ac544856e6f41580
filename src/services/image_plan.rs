use crate::models::{BookDocument, BookParameters, ImageRequest, ImageSlot};
use crate::services::template::{IMAGE_PROMPT_TEMPLATE, render};

/// Longest chapter excerpt, in characters, that goes into an image prompt.
pub const MAX_EXCERPT_CHARS: usize = 500;

pub const CHILD_STYLE: &str =
    "Style: colorful, child-friendly, with characters and visual elements that appeal to children.";
pub const TEEN_STYLE: &str =
    "Style: modern, dynamic, with graphic elements that appeal to teenagers.";
pub const PROFESSIONAL_STYLE: &str =
    "Style: professional, sober, with clear visualizations focused on the information.";
pub const NEUTRAL_STYLE: &str =
    "Style: balanced between visual and professional, adapted to educational content.";
pub const TECHNICAL_STYLE: &str =
    "Technical style: include clear diagrams, precise labels and accurate visual representations.";

const TECHNICAL_TERMS: &[&str] = &[
    "math",
    "programming",
    "science",
    "physics",
    "chemistry",
    "biology",
    "matemátic",
    "programación",
    "ciencia",
    "física",
    "química",
    "biología",
];

/// Picks the style directive for the lower bound of the age range.
pub fn style_directive(params: &BookParameters) -> &'static str {
    match params.min_age() {
        Some(age) if age < 12 => CHILD_STYLE,
        Some(age) if age < 18 => TEEN_STYLE,
        Some(_) => PROFESSIONAL_STYLE,
        None => NEUTRAL_STYLE,
    }
}

/// One cover request followed by one request per chapter, in chapter order.
pub fn build_plan(doc: &BookDocument, params: &BookParameters) -> Vec<ImageRequest> {
    let topic = doc
        .metadata
        .topic
        .as_deref()
        .unwrap_or_else(|| params.topic_or_title());

    let mut requests = Vec::with_capacity(doc.chapters.len() + 1);
    requests.push(ImageRequest {
        slot: ImageSlot::Cover,
        prompt: image_prompt(
            params,
            topic,
            &format!(
                "Cover of the book '{}'. Visual representation of the main topic: {}",
                doc.title, topic
            ),
        ),
        description: "Book cover".to_string(),
    });

    for (i, chapter) in doc.chapters.iter().enumerate() {
        let subject = format!(
            "Illustration for the chapter '{}'. Content: {}",
            chapter.title,
            excerpt(&chapter.content)
        );
        requests.push(ImageRequest {
            slot: ImageSlot::Chapter(i + 1),
            prompt: image_prompt(params, topic, &subject),
            description: format!("Chapter illustration: {}", chapter.title),
        });
    }

    requests
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn image_prompt(params: &BookParameters, topic: &str, subject: &str) -> String {
    let mut values = params.template_values();
    values.insert("topic", topic.to_string());
    values.insert("description", subject.to_string());

    // Every placeholder of the image template is covered by `values`.
    let mut prompt = render(IMAGE_PROMPT_TEMPLATE, &values)
        .unwrap_or_else(|_| format!("{}\n{}", params.title, subject));

    let topic = topic.to_lowercase();
    if TECHNICAL_TERMS.iter().any(|term| topic.contains(term)) {
        prompt.push('\n');
        prompt.push_str(TECHNICAL_STYLE);
    }
    prompt.push('\n');
    prompt.push_str(style_directive(params));
    prompt
}
