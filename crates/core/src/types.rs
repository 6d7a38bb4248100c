//! Domain types for representing a slide deck.
//!
//! All lengths are in EMU (English Metric Units, 12700 EMU = 1 point,
//! 914400 EMU = 1 inch). Font sizes are kept in hundredths of a point, the
//! resolution the package format stores them in.

use serde::{Deserialize, Serialize};

/// Default page width (10 inches) used when a deck does not declare one.
pub const DEFAULT_PAGE_WIDTH: i64 = 9_144_000;

/// Default page height (7.5 inches) used when a deck does not declare one.
pub const DEFAULT_PAGE_HEIGHT: i64 = 6_858_000;

/// A whole deck: page geometry plus slides in presentation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    /// Page width in EMU.
    pub page_width: i64,

    /// Page height in EMU.
    pub page_height: i64,

    /// Slides in presentation order.
    pub slides: Vec<Slide>,
}

impl Deck {
    /// Create an empty deck with the given page size.
    pub fn new(page_width: i64, page_height: i64) -> Self {
        Self {
            page_width,
            page_height,
            slides: Vec::new(),
        }
    }

    /// Append a slide and return it for filling.
    pub fn add_slide(&mut self) -> &mut Slide {
        self.slides.push(Slide::default());
        let last = self.slides.len() - 1;
        &mut self.slides[last]
    }

    /// Full-page geometry, where the background goes.
    pub fn page_geometry(&self) -> Geometry {
        Geometry::new(0, 0, self.page_width, self.page_height)
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
    }
}

/// A single slide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    /// Shapes in z-order, bottom-most first.
    pub shapes: Vec<Shape>,
}

impl Slide {
    /// Add a text box and return its frame for filling.
    pub fn add_text_box(&mut self, geometry: Geometry) -> &mut TextFrame {
        self.shapes.push(Shape {
            geometry,
            kind: ShapeKind::Text(TextFrame::default()),
        });
        match self.shapes.last_mut().map(|s| &mut s.kind) {
            Some(ShapeKind::Text(frame)) => frame,
            _ => unreachable!("text box was just pushed"),
        }
    }

    /// Text shapes on this slide, in order.
    pub fn text_shapes(&self) -> impl Iterator<Item = (&Geometry, &TextFrame)> {
        self.shapes.iter().filter_map(|s| match &s.kind {
            ShapeKind::Text(frame) => Some((&s.geometry, frame)),
            _ => None,
        })
    }
}

/// Position and size of a shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

impl Geometry {
    pub fn new(left: i64, top: i64, width: i64, height: i64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// A positioned element on a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub geometry: Geometry,
    pub kind: ShapeKind,
}

impl Shape {
    /// True if this shape owns a text frame.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ShapeKind::Text(_))
    }
}

/// What a shape is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    /// A shape owning a text frame.
    Text(TextFrame),

    /// A raster picture.
    Picture,

    /// Anything else (tables, charts, groups, connectors). Carries the
    /// element name it was read from.
    Other { element: String },
}

/// Ordered paragraphs of one text shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFrame {
    pub paragraphs: Vec<Paragraph>,
}

impl TextFrame {
    /// Whole text, paragraphs joined by newlines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True when the text contains nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }

    /// Drop every paragraph, including the default empty one.
    pub fn clear(&mut self) {
        self.paragraphs.clear();
    }

    /// Append a paragraph and return it for filling.
    pub fn add_paragraph(&mut self, text: impl Into<String>) -> &mut Paragraph {
        self.paragraphs.push(Paragraph::new(text));
        let last = self.paragraphs.len() - 1;
        &mut self.paragraphs[last]
    }
}

impl Default for TextFrame {
    /// A new frame holds a single empty paragraph, like a fresh text box.
    fn default() -> Self {
        Self {
            paragraphs: vec![Paragraph::default()],
        }
    }
}

/// One paragraph with its basic formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Literal text. Line breaks inside the paragraph are `\u{b}`.
    pub text: String,

    /// Explicit font size, if any.
    pub size: Option<FontSize>,

    /// Bold: `None` inherits.
    pub bold: Option<bool>,

    /// Italic: `None` inherits.
    pub italic: Option<bool>,
}

impl Paragraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: FontSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = Some(italic);
        self
    }
}

/// Font size in hundredths of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FontSize(u32);

impl FontSize {
    /// Size used for paragraphs without an explicit one.
    pub const DEFAULT: FontSize = FontSize(1800);

    /// From the raw `sz` value (hundredths of a point).
    pub const fn from_centipoints(value: u32) -> Self {
        Self(value)
    }

    /// From whole points.
    pub const fn from_points(points: u32) -> Self {
        Self(points * 100)
    }

    pub fn centipoints(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_text_joins_paragraphs() {
        let mut frame = TextFrame::default();
        frame.clear();
        frame.add_paragraph("Amazing grace");
        frame.add_paragraph("how sweet");
        assert_eq!(frame.text(), "Amazing grace\nhow sweet");
        assert!(!frame.is_blank());
    }

    #[test]
    fn test_default_frame_is_one_empty_paragraph() {
        let frame = TextFrame::default();
        assert_eq!(frame.paragraphs, vec![Paragraph::default()]);
        assert!(frame.is_blank());
    }

    #[test]
    fn test_whitespace_frame_is_blank() {
        let frame = TextFrame {
            paragraphs: vec![Paragraph::new("  "), Paragraph::new("\t")],
        };
        assert!(frame.is_blank());
    }

    #[test]
    fn test_font_size_units() {
        assert_eq!(FontSize::from_points(24).centipoints(), 2400);
        assert_eq!(FontSize::from_centipoints(1050).centipoints(), 1050);
        assert_eq!(FontSize::DEFAULT, FontSize::from_points(18));
    }

    #[test]
    fn test_text_shapes_skip_other_kinds() {
        let mut slide = Slide::default();
        slide.shapes.push(Shape {
            geometry: Geometry::default(),
            kind: ShapeKind::Picture,
        });
        slide
            .add_text_box(Geometry::new(1, 2, 3, 4))
            .add_paragraph("x");

        let texts: Vec<_> = slide.text_shapes().collect();
        assert_eq!(texts.len(), 1);
        assert_eq!(*texts[0].0, Geometry::new(1, 2, 3, 4));
    }

    #[test]
    fn test_shape_kind_serializes_tagged() {
        let shape = Shape {
            geometry: Geometry::new(0, 0, 10, 10),
            kind: ShapeKind::Other {
                element: "graphicFrame".into(),
            },
        };
        let json = serde_json::to_string(&shape).unwrap();
        assert!(json.contains(r#""type":"other""#));
        assert!(json.contains(r#""element":"graphicFrame""#));
    }
}
