//! Background replacement: read a deck, rebuild its text onto blank slides
//! over a new background picture, write the result.

use std::path::Path;

use deckbg_core::{rebuild_text_layer, BackgroundImage, Error, Result};

use crate::parser::PptxParser;
use crate::writer::PptxWriter;

/// What a successful transform produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSummary {
    pub slides: usize,
    pub text_boxes: usize,
}

/// Rebuilds decks over a background image.
#[derive(Default)]
pub struct TransformEngine {
    parser: PptxParser,
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform `source` with `image` as background into `output`.
    ///
    /// Any failure is reported as [`Error::Transform`] and leaves `output`
    /// untouched.
    pub fn run(
        &self,
        source: impl AsRef<Path>,
        image: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<TransformSummary> {
        let (source, image, output) = (source.as_ref(), image.as_ref(), output.as_ref());

        self.try_run(source, image, output).map_err(|e| {
            log::error!("Transform of {} failed: {}", source.display(), e);
            e.into_transform()
        })
    }

    fn try_run(&self, source: &Path, image: &Path, output: &Path) -> Result<TransformSummary> {
        let source_deck = self.parser.open(source)?;
        let background = BackgroundImage::open(image)?;

        let rebuilt = rebuild_text_layer(&source_deck);
        let summary = TransformSummary {
            slides: rebuilt.slides.len(),
            text_boxes: rebuilt.slides.iter().map(|s| s.shapes.len()).sum(),
        };

        PptxWriter::new()
            .with_background(background)
            .save(&rebuilt, output)?;

        log::info!(
            "Rebuilt {} ({} slides, {} text boxes) into {}",
            source.display(),
            summary.slides,
            summary.text_boxes,
            output.display()
        );
        Ok(summary)
    }
}

/// Transform a deck in one call. See [`TransformEngine::run`].
pub fn transform_deck(
    source: impl AsRef<Path>,
    image: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<()> {
    TransformEngine::new().run(source, image, output).map(|_| ())
}

/// Reject uploads that are not `.pptx` by name, before anything is fetched.
pub fn check_deck_file_name(file_name: &str) -> Result<()> {
    let is_pptx = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pptx"));

    if is_pptx {
        Ok(())
    } else {
        Err(Error::InputFormat(file_name.to_string()))
    }
}
