//! PPTX (Office Open XML) backend for deck background replacement.
//!
//! Reads .pptx packages into the core deck model, writes rebuilt decks back
//! out, and ties both together in [`TransformEngine`].

mod package;
pub mod parser;
pub mod template;
pub mod transform;
pub mod writer;

pub use parser::PptxParser;
pub use transform::{check_deck_file_name, transform_deck, TransformEngine, TransformSummary};
pub use writer::PptxWriter;
