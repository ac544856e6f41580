pub mod assembler;
pub mod image_plan;
pub mod images;
pub mod llm;
pub mod normalizer;
pub mod pipeline;
pub mod template;
