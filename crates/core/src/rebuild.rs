//! Rebuilding a deck's text content onto blank slides.

use crate::types::{Deck, FontSize, Paragraph};

/// Build the text-only copy of `source` that goes on top of a new background.
///
/// Page size and slide order are kept. Each text shape becomes a text box at
/// the same geometry; everything else is dropped. Frames whose text is blank
/// keep only the default empty paragraph. Copied paragraphs get the source
/// size or [`FontSize::DEFAULT`], and the source bold/italic as-is.
pub fn rebuild_text_layer(source: &Deck) -> Deck {
    let mut output = Deck::new(source.page_width, source.page_height);

    for source_slide in &source.slides {
        let slide = output.add_slide();

        for (geometry, source_frame) in source_slide.text_shapes() {
            let frame = slide.add_text_box(*geometry);
            if source_frame.is_blank() {
                continue;
            }

            frame.clear();
            for paragraph in &source_frame.paragraphs {
                frame.paragraphs.push(copy_paragraph(paragraph));
            }
        }
    }

    output
}

fn copy_paragraph(source: &Paragraph) -> Paragraph {
    Paragraph {
        text: source.text.clone(),
        size: Some(source.size.unwrap_or(FontSize::DEFAULT)),
        bold: source.bold,
        italic: source.italic,
    }
}
