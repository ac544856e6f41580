//! Generates illustrated educational books: a language model writes the
//! content, an image model illustrates it, and the result is assembled into
//! an EPUB or PDF.

pub mod config;
pub mod models;
pub mod services;
