//! PPTX file parser implementation.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::rc::Rc;

use deckbg_core::types::{DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};
use deckbg_core::{
    Deck, Error, FontSize, Geometry, Paragraph, Result, Shape, ShapeKind, Slide, TextFrame,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::package::{
    extract_slide_number, local_name, resolve_target, Package, REL_SLIDE, REL_SLIDE_LAYOUT,
    REL_SLIDE_MASTER,
};

/// Top-level elements of a shape tree that are shapes.
const SHAPE_ELEMENTS: &[&[u8]] = &[
    b"sp",
    b"pic",
    b"grpSp",
    b"graphicFrame",
    b"cxnSp",
    b"contentPart",
];

/// Parser for PPTX (Office Open XML) files.
pub struct PptxParser;

impl PptxParser {
    /// Create a new PPTX parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a PPTX file on disk.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Deck> {
        let file = File::open(path.as_ref())?;
        self.parse(BufReader::new(file))
    }

    /// Parse a PPTX file from a reader.
    pub fn parse<R: Read + Seek>(&self, reader: R) -> Result<Deck> {
        let mut package = Package::open(reader)?;
        let presentation_part = package.presentation_part()?;
        let presentation_xml = package.read_part(&presentation_part)?;
        let presentation = read_presentation(&presentation_xml)?;

        let mut deck = Deck::new(presentation.page_width, presentation.page_height);
        let slide_order = self.get_slide_order(&mut package, &presentation_part, &presentation)?;
        let mut inherited = InheritanceCache::default();

        for slide_path in &slide_order {
            let slide = self.parse_slide(&mut package, slide_path, &mut inherited)?;
            deck.slides.push(slide);
        }

        log::debug!(
            "Parsed deck: {} slides, page {}x{} EMU",
            deck.slides.len(),
            deck.page_width,
            deck.page_height
        );

        Ok(deck)
    }

    /// Get the ordered list of slide parts.
    ///
    /// The slide id list is authoritative. Decks without one fall back to
    /// the slide relationships sorted by their trailing number.
    fn get_slide_order<R: Read + Seek>(
        &self,
        package: &mut Package<R>,
        presentation_part: &str,
        presentation: &PresentationInfo,
    ) -> Result<Vec<String>> {
        let rels = package.relationships(presentation_part)?;

        if let Some(slide_ids) = &presentation.slide_rel_ids {
            return slide_ids
                .iter()
                .map(|rel_id| {
                    rels.iter()
                        .find(|rel| &rel.id == rel_id && rel.is(REL_SLIDE))
                        .map(|rel| resolve_target(presentation_part, &rel.target))
                        .ok_or_else(|| {
                            Error::CorruptedFile(format!(
                                "Slide relationship '{}' is missing",
                                rel_id
                            ))
                        })
                })
                .collect();
        }

        let mut slides: Vec<(String, Option<usize>)> = rels
            .iter()
            .filter(|rel| rel.is(REL_SLIDE) && !rel.external)
            .map(|rel| {
                let order =
                    extract_slide_number(&rel.target).or_else(|| extract_slide_number(&rel.id));
                (resolve_target(presentation_part, &rel.target), order)
            })
            .collect();

        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }

    /// Parse a single slide from the package.
    fn parse_slide<R: Read + Seek>(
        &self,
        package: &mut Package<R>,
        slide_path: &str,
        inherited: &mut InheritanceCache,
    ) -> Result<Slide> {
        let content = package.read_part(slide_path)?;
        let shapes = read_shape_tree(&content)
            .map_err(|e| Error::XmlError(format!("{}: {}", slide_path, e)))?;

        let needs_layout = shapes
            .iter()
            .any(|s| s.geometry.is_none() && s.placeholder.is_some());
        let layout = if needs_layout {
            inherited.for_slide(package, slide_path)
        } else {
            None
        };

        let shapes = shapes
            .into_iter()
            .map(|shape| {
                let geometry = shape
                    .geometry
                    .or_else(|| {
                        let placeholder = shape.placeholder.as_ref()?;
                        layout.as_ref()?.geometry_for(placeholder)
                    })
                    .unwrap_or_default();
                Shape {
                    geometry,
                    kind: shape.kind,
                }
            })
            .collect();

        Ok(Slide { shapes })
    }
}

impl Default for PptxParser {
    fn default() -> Self {
        Self::new()
    }
}

/// What the presentation part says about the deck.
#[derive(Debug)]
struct PresentationInfo {
    page_width: i64,
    page_height: i64,
    /// Relationship ids of `p:sldIdLst`, `None` when the list is absent.
    slide_rel_ids: Option<Vec<String>>,
}

fn read_presentation(xml: &str) -> Result<PresentationInfo> {
    let mut info = PresentationInfo {
        page_width: DEFAULT_PAGE_WIDTH,
        page_height: DEFAULT_PAGE_HEIGHT,
        slide_rel_ids: None,
    };

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match local_name(e.name().as_ref()) {
                    b"sldSz" => {
                        if let Some(cx) = int_attr(e, b"cx")? {
                            info.page_width = cx;
                        }
                        if let Some(cy) = int_attr(e, b"cy")? {
                            info.page_height = cy;
                        }
                    }
                    b"sldIdLst" => {
                        info.slide_rel_ids.get_or_insert_with(Vec::new);
                    }
                    b"sldId" => {
                        if let Some(rel_id) = relationship_id_attr(e)? {
                            info.slide_rel_ids.get_or_insert_with(Vec::new).push(rel_id);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing presentation: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(info)
}

/// A shape as read from a shape tree, before placeholder inheritance.
#[derive(Debug, Clone)]
struct ParsedShape {
    kind: ShapeKind,
    geometry: Option<Geometry>,
    placeholder: Option<Placeholder>,
}

/// Placeholder identity of a shape (`p:nvPr/p:ph`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    ph_type: String,
    idx: u32,
}

impl Placeholder {
    fn from_element(e: &BytesStart) -> Result<Self> {
        let ph_type = str_attr(e, b"type")?.unwrap_or_else(|| "obj".to_string());
        let idx = int_attr(e, b"idx")?
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        Ok(Self { ph_type, idx })
    }

    /// The master placeholder type a layout placeholder inherits from.
    fn master_type(&self) -> &str {
        match self.ph_type.as_str() {
            "ctrTitle" | "title" => "title",
            "dt" => "dt",
            "ftr" => "ftr",
            "sldNum" => "sldNum",
            _ => "body",
        }
    }
}

/// Layout and master shapes a slide's placeholders inherit from.
#[derive(Debug, Default)]
struct Inheritance {
    layout: Vec<ParsedShape>,
    master: Vec<ParsedShape>,
}

impl Inheritance {
    fn geometry_for(&self, placeholder: &Placeholder) -> Option<Geometry> {
        let layout_shape = self
            .layout
            .iter()
            .find(|s| s.placeholder.as_ref().is_some_and(|p| p.idx == placeholder.idx))
            .or_else(|| {
                self.layout.iter().find(|s| {
                    s.placeholder
                        .as_ref()
                        .is_some_and(|p| p.ph_type == placeholder.ph_type)
                })
            });

        if let Some(geometry) = layout_shape.and_then(|s| s.geometry) {
            return Some(geometry);
        }

        let base = layout_shape
            .and_then(|s| s.placeholder.as_ref())
            .unwrap_or(placeholder);
        let master_type = base.master_type();

        self.master
            .iter()
            .find(|s| {
                s.placeholder
                    .as_ref()
                    .is_some_and(|p| p.master_type() == master_type)
            })
            .and_then(|s| s.geometry)
    }
}

/// Parsed layouts keyed by part path.
#[derive(Default)]
struct InheritanceCache {
    layouts: HashMap<String, Option<Rc<Inheritance>>>,
}

impl InheritanceCache {
    /// Inheritance chain for a slide. Unreadable layouts only lose geometry
    /// inheritance, they do not fail the deck.
    fn for_slide<R: Read + Seek>(
        &mut self,
        package: &mut Package<R>,
        slide_path: &str,
    ) -> Option<Rc<Inheritance>> {
        let layout_path = match find_related(package, slide_path, REL_SLIDE_LAYOUT) {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cannot resolve layout of {}: {}", slide_path, e);
                return None;
            }
        };

        if let Some(cached) = self.layouts.get(&layout_path) {
            return cached.clone();
        }

        let loaded = match load_inheritance(package, &layout_path) {
            Ok(inheritance) => Some(Rc::new(inheritance)),
            Err(e) => {
                log::warn!("Ignoring layout {}: {}", layout_path, e);
                None
            }
        };
        self.layouts.insert(layout_path, loaded.clone());
        loaded
    }
}

fn load_inheritance<R: Read + Seek>(
    package: &mut Package<R>,
    layout_path: &str,
) -> Result<Inheritance> {
    let layout = read_shape_tree(&package.read_part(layout_path)?)?;
    let master = match find_related(package, layout_path, REL_SLIDE_MASTER)? {
        Some(master_path) => read_shape_tree(&package.read_part(&master_path)?)?,
        None => Vec::new(),
    };
    Ok(Inheritance { layout, master })
}

fn find_related<R: Read + Seek>(
    package: &mut Package<R>,
    part: &str,
    rel_suffix: &str,
) -> Result<Option<String>> {
    Ok(package
        .relationships(part)?
        .into_iter()
        .find(|rel| rel.is(rel_suffix) && !rel.external)
        .map(|rel| resolve_target(part, &rel.target)))
}

/// Read the top-level shapes of the first `p:spTree` in a slide, layout or
/// master part.
fn read_shape_tree(xml: &str) -> Result<Vec<ParsedShape>> {
    let mut reader = Reader::from_str(xml);
    let mut tree = ShapeTreeReader::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => tree.open(e)?,
            Ok(Event::Empty(ref e)) => {
                tree.open(e)?;
                tree.close();
            }
            Ok(Event::End(_)) => tree.close(),
            Ok(Event::Text(ref e)) if tree.in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::XmlError(format!("Bad text content: {}", e)))?;
                tree.push_text(&text);
            }
            Ok(Event::CData(ref e)) if tree.in_text => {
                tree.push_text(&String::from_utf8_lossy(e));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(tree.shapes)
}

/// Run properties that carry over into the rebuilt paragraph.
#[derive(Debug, Default, Clone, Copy)]
struct RunProps {
    size: Option<FontSize>,
    bold: Option<bool>,
    italic: Option<bool>,
}

impl RunProps {
    /// Take attributes this set does not have yet.
    fn fill_from(&mut self, e: &BytesStart) -> Result<()> {
        if self.size.is_none() {
            self.size = int_attr(e, b"sz")?
                .and_then(|v| u32::try_from(v).ok())
                .map(FontSize::from_centipoints);
        }
        if self.bold.is_none() {
            self.bold = bool_attr(e, b"b")?;
        }
        if self.italic.is_none() {
            self.italic = bool_attr(e, b"i")?;
        }
        Ok(())
    }

    fn or(self, other: RunProps) -> RunProps {
        RunProps {
            size: self.size.or(other.size),
            bold: self.bold.or(other.bold),
            italic: self.italic.or(other.italic),
        }
    }
}

#[derive(Debug, Default)]
struct ParagraphBuilder {
    text: String,
    /// `a:pPr/a:defRPr`
    paragraph: RunProps,
    /// First run carrying each attribute.
    runs: RunProps,
    /// `a:endParaRPr`
    end: RunProps,
}

impl ParagraphBuilder {
    /// Each attribute comes from `a:defRPr` if set there, else from the first
    /// run that sets it, else from `a:endParaRPr`.
    fn finish(self) -> Paragraph {
        let props = self.paragraph.or(self.runs).or(self.end);
        Paragraph {
            text: self.text,
            size: props.size,
            bold: props.bold,
            italic: props.italic,
        }
    }
}

#[derive(Debug)]
struct ShapeBuilder {
    element: Vec<u8>,
    /// Stack index of the shape element.
    depth: usize,
    offset: Option<(i64, i64)>,
    extent: Option<(i64, i64)>,
    placeholder: Option<Placeholder>,
    has_text_body: bool,
    paragraphs: Vec<Paragraph>,
}

impl ShapeBuilder {
    fn new(element: Vec<u8>, depth: usize) -> Self {
        Self {
            element,
            depth,
            offset: None,
            extent: None,
            placeholder: None,
            has_text_body: false,
            paragraphs: Vec::new(),
        }
    }

    fn finish(self) -> ParsedShape {
        let geometry = match (self.offset, self.extent) {
            (Some((left, top)), Some((width, height))) => {
                Some(Geometry::new(left, top, width, height))
            }
            _ => None,
        };

        let kind = match self.element.as_slice() {
            // A text-capable shape without a body reads as one empty paragraph.
            b"sp" if self.has_text_body => ShapeKind::Text(TextFrame {
                paragraphs: self.paragraphs,
            }),
            b"sp" => ShapeKind::Text(TextFrame::default()),
            b"pic" => ShapeKind::Picture,
            other => ShapeKind::Other {
                element: String::from_utf8_lossy(other).into_owned(),
            },
        };

        ParsedShape {
            kind,
            geometry,
            placeholder: self.placeholder,
        }
    }
}

/// Event-driven state for [`read_shape_tree`].
#[derive(Debug, Default)]
struct ShapeTreeReader {
    /// Local names of the open elements.
    stack: Vec<Vec<u8>>,
    tree_depth: Option<usize>,
    shape: Option<ShapeBuilder>,
    paragraph: Option<ParagraphBuilder>,
    in_text: bool,
    shapes: Vec<ParsedShape>,
}

impl ShapeTreeReader {
    fn open(&mut self, e: &BytesStart) -> Result<()> {
        let name = local_name(e.name().as_ref()).to_vec();
        let depth = self.stack.len();
        let parent: &[u8] = self.stack.last().map(Vec::as_slice).unwrap_or_default();

        if let Some(shape) = self.shape.as_mut() {
            let is_sp = shape.element == b"sp";
            match name.as_slice() {
                b"ph" if parent == b"nvPr" && depth == shape.depth + 3 => {
                    shape.placeholder = Some(Placeholder::from_element(e)?);
                }
                b"off" if parent == b"xfrm" && depth <= shape.depth + 3 => {
                    shape.offset = Some((
                        int_attr(e, b"x")?.unwrap_or(0),
                        int_attr(e, b"y")?.unwrap_or(0),
                    ));
                }
                b"ext" if parent == b"xfrm" && depth <= shape.depth + 3 => {
                    shape.extent = Some((
                        int_attr(e, b"cx")?.unwrap_or(0),
                        int_attr(e, b"cy")?.unwrap_or(0),
                    ));
                }
                b"txBody" if is_sp && depth == shape.depth + 1 => {
                    shape.has_text_body = true;
                }
                b"p" if shape.has_text_body && depth == shape.depth + 2 => {
                    self.paragraph = Some(ParagraphBuilder::default());
                }
                _ => {
                    if let Some(paragraph) = self.paragraph.as_mut() {
                        match name.as_slice() {
                            b"defRPr" if parent == b"pPr" => paragraph.paragraph.fill_from(e)?,
                            b"rPr" if parent == b"r" => paragraph.runs.fill_from(e)?,
                            b"endParaRPr" if parent == b"p" => paragraph.end.fill_from(e)?,
                            b"t" if parent == b"r" || parent == b"fld" => self.in_text = true,
                            b"br" if parent == b"p" => paragraph.text.push('\u{b}'),
                            _ => {}
                        }
                    }
                }
            }
        } else if let Some(tree_depth) = self.tree_depth {
            if depth == tree_depth + 1
                && parent == b"spTree"
                && SHAPE_ELEMENTS.contains(&name.as_slice())
            {
                self.shape = Some(ShapeBuilder::new(name.clone(), depth));
            }
        } else if name == b"spTree" {
            self.tree_depth = Some(depth);
        }

        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let depth = self.stack.len();

        if name == b"t" {
            self.in_text = false;
        }

        let Some(shape) = self.shape.as_mut() else {
            return;
        };

        if name == b"p" && depth == shape.depth + 2 {
            if let Some(paragraph) = self.paragraph.take() {
                shape.paragraphs.push(paragraph.finish());
            }
        } else if depth == shape.depth {
            if let Some(shape) = self.shape.take() {
                self.shapes.push(shape.finish());
            }
            self.paragraph = None;
            self.in_text = false;
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(paragraph) = self.paragraph.as_mut() {
            paragraph.text.push_str(text);
        }
    }
}

fn str_attr(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::XmlError(format!("Bad attribute: {}", e)))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::XmlError(format!("Bad attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn int_attr(e: &BytesStart, key: &[u8]) -> Result<Option<i64>> {
    match str_attr(e, key)? {
        Some(value) => value.trim().parse::<i64>().map(Some).map_err(|_| {
            Error::XmlError(format!(
                "Attribute {} is not an integer: '{}'",
                String::from_utf8_lossy(key),
                value
            ))
        }),
        None => Ok(None),
    }
}

fn bool_attr(e: &BytesStart, key: &[u8]) -> Result<Option<bool>> {
    Ok(match str_attr(e, key)?.as_deref() {
        Some("1") | Some("true") | Some("on") => Some(true),
        Some("0") | Some("false") | Some("off") => Some(false),
        Some(other) => {
            log::debug!(
                "Ignoring unrecognized {} value '{}'",
                String::from_utf8_lossy(key),
                other
            );
            None
        }
        None => None,
    })
}

/// The `r:id` attribute, whatever prefix the relationships namespace uses.
fn relationship_id_attr(e: &BytesStart) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::XmlError(format!("Bad attribute: {}", e)))?;
        let key = attr.key.as_ref();
        if key.contains(&b':') && local_name(key) == b"id" {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::XmlError(format!("Bad attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
