//! PPTX package writer.
//!
//! Writes a [`Deck`] as a complete package: every slide is based on a blank
//! layout, optionally gets a full-page background picture as its bottom-most
//! shape, and carries its text shapes as plain text boxes.

use std::fmt::Write as FmtWrite;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use deckbg_core::{BackgroundImage, Deck, Error, Paragraph, Result, ShapeKind, Slide};
use quick_xml::escape::escape;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::template;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_PML: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const RT_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const RT_CORE_PROPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

const CT_PRESENTATION: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const CT_SLIDE_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
const CT_SLIDE_LAYOUT: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
const CT_THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
const CT_PRES_PROPS: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presProps+xml";
const CT_VIEW_PROPS: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.viewProps+xml";
const CT_TABLE_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.tableStyles+xml";
const CT_CORE_PROPS: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const CT_APP_PROPS: &str =
    "application/vnd.openxmlformats-officedocument.extended-properties+xml";

/// Relationship ids of `presentation.xml.rels` before the slides.
const FIXED_PRESENTATION_RELS: usize = 5;

/// First `p:sldId` value allowed by the format.
const FIRST_SLIDE_ID: usize = 256;

/// Shape id of the slide's group shape; real shapes start after it.
const GROUP_SHAPE_ID: u32 = 1;

/// Writer for PPTX packages.
#[derive(Debug, Default, Clone)]
pub struct PptxWriter {
    background: Option<BackgroundImage>,
}

impl PptxWriter {
    /// A writer that adds no background.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stretch `image` over every slide, below all other shapes.
    pub fn with_background(mut self, image: BackgroundImage) -> Self {
        self.background = Some(image);
        self
    }

    /// Write the package to `path`.
    ///
    /// The package is assembled in a temporary file next to `path` and moved
    /// into place only when complete, so a failed save leaves nothing behind.
    pub fn save(&self, deck: &Deck, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staging = tempfile::Builder::new()
            .prefix(".deckbg-")
            .suffix(".pptx.part")
            .tempfile_in(dir)?;

        let buffered = self.write(deck, BufWriter::new(staging.as_file_mut()))?;
        buffered
            .into_inner()
            .map_err(|e| Error::IoError(e.into_error()))?;
        staging.as_file().sync_all()?;

        staging.persist(path).map_err(|e| Error::IoError(e.error))?;
        log::debug!("Saved {} slides to {}", deck.slides.len(), path.display());
        Ok(())
    }

    /// Write the package into `writer`, returning it once finished.
    pub fn write<W: Write + Seek>(&self, deck: &Deck, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let put = |zip: &mut ZipWriter<W>, name: &str, data: &[u8]| -> Result<()> {
            zip.start_file(name, options)
                .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", name, e)))?;
            zip.write_all(data)?;
            Ok(())
        };

        let slide_count = deck.slides.len();

        put(&mut zip, "[Content_Types].xml", self.content_types_xml(slide_count)?.as_bytes())?;
        put(&mut zip, "_rels/.rels", package_rels_xml().as_bytes())?;
        put(&mut zip, "docProps/core.xml", template::core_props_xml().as_bytes())?;
        put(&mut zip, "docProps/app.xml", app_props_xml(slide_count)?.as_bytes())?;

        put(&mut zip, "ppt/presentation.xml", presentation_xml(deck)?.as_bytes())?;
        put(
            &mut zip,
            "ppt/_rels/presentation.xml.rels",
            presentation_rels_xml(slide_count).as_bytes(),
        )?;
        put(&mut zip, "ppt/presProps.xml", template::pres_props_xml().as_bytes())?;
        put(&mut zip, "ppt/viewProps.xml", template::view_props_xml().as_bytes())?;
        put(&mut zip, "ppt/tableStyles.xml", template::table_styles_xml().as_bytes())?;

        put(
            &mut zip,
            "ppt/slideMasters/slideMaster1.xml",
            template::slide_master_xml().as_bytes(),
        )?;
        put(
            &mut zip,
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels_xml(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "theme", "../theme/theme1.xml"),
            ])
            .as_bytes(),
        )?;
        put(
            &mut zip,
            "ppt/slideLayouts/slideLayout1.xml",
            template::blank_layout_xml().as_bytes(),
        )?;
        put(
            &mut zip,
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels_xml(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]).as_bytes(),
        )?;
        put(&mut zip, "ppt/theme/theme1.xml", template::theme_xml().as_bytes())?;

        // One media part shared by every slide.
        let media_target = self
            .background
            .as_ref()
            .map(|image| format!("../media/image1.{}", image.format.extension()));
        if let Some(image) = &self.background {
            put(
                &mut zip,
                &format!("ppt/media/image1.{}", image.format.extension()),
                &image.data,
            )?;
        }

        for (index, slide) in deck.slides.iter().enumerate() {
            let number = index + 1;
            let xml = slide_xml(slide, deck, media_target.is_some())?;
            put(&mut zip, &format!("ppt/slides/slide{}.xml", number), xml.as_bytes())?;

            let mut rels = vec![("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml")];
            if let Some(target) = &media_target {
                rels.push(("rId2", "image", target.as_str()));
            }
            put(
                &mut zip,
                &format!("ppt/slides/_rels/slide{}.xml.rels", number),
                rels_xml(&rels).as_bytes(),
            )?;
        }

        zip.finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish package: {}", e)))
    }

    fn content_types_xml(&self, slide_count: usize) -> Result<String> {
        let mut xml = String::with_capacity(2048);
        xml.push_str(XML_DECLARATION);
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
        xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);

        if let Some(image) = &self.background {
            write!(
                xml,
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                image.format.extension(),
                image.format.content_type()
            )
            .map_err(|e| Error::XmlError(e.to_string()))?;
        }

        let fixed = [
            ("/ppt/presentation.xml", CT_PRESENTATION),
            ("/ppt/slideMasters/slideMaster1.xml", CT_SLIDE_MASTER),
            ("/ppt/slideLayouts/slideLayout1.xml", CT_SLIDE_LAYOUT),
            ("/ppt/theme/theme1.xml", CT_THEME),
            ("/ppt/presProps.xml", CT_PRES_PROPS),
            ("/ppt/viewProps.xml", CT_VIEW_PROPS),
            ("/ppt/tableStyles.xml", CT_TABLE_STYLES),
            ("/docProps/core.xml", CT_CORE_PROPS),
            ("/docProps/app.xml", CT_APP_PROPS),
        ];
        for (part, content_type) in fixed {
            write!(
                xml,
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                part, content_type
            )
            .map_err(|e| Error::XmlError(e.to_string()))?;
        }

        for number in 1..=slide_count {
            write!(
                xml,
                r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="{}"/>"#,
                number, CT_SLIDE
            )
            .map_err(|e| Error::XmlError(e.to_string()))?;
        }

        xml.push_str("</Types>");
        Ok(xml)
    }
}

/// A `.rels` part from `(id, type, target)` triples. Short types are
/// officeDocument relationship names, full URIs are used as given.
fn rels_xml(rels: &[(&str, &str, &str)]) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECLARATION);
    xml.push_str(r#"<Relationships xmlns=""#);
    xml.push_str(RELS_NS);
    xml.push_str(r#"">"#);
    for (id, rel_type, target) in rels {
        let rel_type = if rel_type.contains("://") {
            rel_type.to_string()
        } else {
            format!("{}/{}", RT_BASE, rel_type)
        };
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            id,
            rel_type,
            escape(*target)
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn package_rels_xml() -> String {
    rels_xml(&[
        ("rId1", "officeDocument", "ppt/presentation.xml"),
        ("rId2", RT_CORE_PROPS, "docProps/core.xml"),
        ("rId3", "extended-properties", "docProps/app.xml"),
    ])
}

fn presentation_rels_xml(slide_count: usize) -> String {
    let slide_targets: Vec<(String, String)> = (1..=slide_count)
        .map(|number| {
            (
                format!("rId{}", FIXED_PRESENTATION_RELS + number),
                format!("slides/slide{}.xml", number),
            )
        })
        .collect();

    let mut rels = vec![
        ("rId1", "slideMaster", "slideMasters/slideMaster1.xml"),
        ("rId2", "theme", "theme/theme1.xml"),
        ("rId3", "presProps", "presProps.xml"),
        ("rId4", "viewProps", "viewProps.xml"),
        ("rId5", "tableStyles", "tableStyles.xml"),
    ];
    for (id, target) in &slide_targets {
        rels.push((id.as_str(), "slide", target.as_str()));
    }

    rels_xml(&rels)
}

fn presentation_xml(deck: &Deck) -> Result<String> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_DECLARATION);
    write!(xml, r#"<p:presentation {} saveSubsetFonts="1">"#, NS_PML)
        .map_err(|e| Error::XmlError(e.to_string()))?;

    xml.push_str(r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#);

    if !deck.slides.is_empty() {
        xml.push_str("<p:sldIdLst>");
        for index in 0..deck.slides.len() {
            write!(
                xml,
                r#"<p:sldId id="{}" r:id="rId{}"/>"#,
                FIRST_SLIDE_ID + index,
                FIXED_PRESENTATION_RELS + index + 1
            )
            .map_err(|e| Error::XmlError(e.to_string()))?;
        }
        xml.push_str("</p:sldIdLst>");
    }

    write!(
        xml,
        r#"<p:sldSz cx="{}" cy="{}"/>"#,
        deck.page_width, deck.page_height
    )
    .map_err(|e| Error::XmlError(e.to_string()))?;
    xml.push_str(r#"<p:notesSz cx="6858000" cy="9144000"/>"#);
    xml.push_str("</p:presentation>");

    Ok(xml)
}

fn app_props_xml(slide_count: usize) -> Result<String> {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECLARATION);
    xml.push_str(r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#);
    xml.push_str("<Application>deckbg</Application>");
    write!(xml, "<Slides>{}</Slides>", slide_count).map_err(|e| Error::XmlError(e.to_string()))?;
    xml.push_str("</Properties>");
    Ok(xml)
}

/// Slide XML: background picture first (when present), then text boxes.
fn slide_xml(slide: &Slide, deck: &Deck, with_background: bool) -> Result<String> {
    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECLARATION);
    write!(xml, "<p:sld {}>", NS_PML).map_err(|e| Error::XmlError(e.to_string()))?;
    xml.push_str("<p:cSld><p:spTree>");
    write!(
        xml,
        r#"<p:nvGrpSpPr><p:cNvPr id="{}" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
        GROUP_SHAPE_ID
    )
    .map_err(|e| Error::XmlError(e.to_string()))?;
    xml.push_str(r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#);

    let mut next_id = GROUP_SHAPE_ID + 1;

    if with_background {
        let page = deck.page_geometry();
        xml.push_str("<p:pic><p:nvPicPr>");
        write!(xml, r#"<p:cNvPr id="{}" name="Background"/>"#, next_id)
            .map_err(|e| Error::XmlError(e.to_string()))?;
        xml.push_str(r#"<p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>"#);
        xml.push_str(r#"<p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>"#);
        xml.push_str("<p:spPr>");
        write_xfrm(&mut xml, page.left, page.top, page.width, page.height)?;
        xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#);
        next_id += 1;
    }

    for shape in &slide.shapes {
        let ShapeKind::Text(frame) = &shape.kind else {
            log::debug!("Skipping non-text shape on write: {:?}", shape.kind);
            continue;
        };

        let g = shape.geometry;
        xml.push_str("<p:sp><p:nvSpPr>");
        write!(
            xml,
            r#"<p:cNvPr id="{}" name="TextBox {}"/>"#,
            next_id,
            next_id - 1
        )
        .map_err(|e| Error::XmlError(e.to_string()))?;
        xml.push_str(r#"<p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr>"#);
        xml.push_str("<p:spPr>");
        write_xfrm(&mut xml, g.left, g.top, g.width, g.height)?;
        xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr>"#);
        xml.push_str(r#"<p:txBody><a:bodyPr wrap="none" rtlCol="0"><a:spAutoFit/></a:bodyPr><a:lstStyle/>"#);
        for paragraph in &frame.paragraphs {
            write_paragraph(&mut xml, paragraph)?;
        }
        xml.push_str("</p:txBody></p:sp>");
        next_id += 1;
    }

    xml.push_str("</p:spTree></p:cSld>");
    xml.push_str("<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>");
    xml.push_str("</p:sld>");
    Ok(xml)
}

fn write_xfrm(xml: &mut String, x: i64, y: i64, cx: i64, cy: i64) -> Result<()> {
    write!(
        xml,
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        x, y, cx, cy
    )
    .map_err(|e| Error::XmlError(e.to_string()))
}

/// One `a:p`. Line breaks (`\u{b}` or `\n`) become `a:br`; no color is ever
/// written, so text takes the theme's default.
fn write_paragraph(xml: &mut String, paragraph: &Paragraph) -> Result<()> {
    let has_props =
        paragraph.size.is_some() || paragraph.bold.is_some() || paragraph.italic.is_some();
    if paragraph.text.is_empty() && !has_props {
        xml.push_str("<a:p/>");
        return Ok(());
    }

    let props = run_props_attrs(paragraph);
    xml.push_str("<a:p>");

    for (index, line) in paragraph.text.split(['\u{b}', '\n']).enumerate() {
        if index > 0 {
            write!(xml, "<a:br><a:rPr{}/></a:br>", props)
                .map_err(|e| Error::XmlError(e.to_string()))?;
        }
        if !line.is_empty() {
            write!(
                xml,
                "<a:r><a:rPr{}/><a:t>{}</a:t></a:r>",
                props,
                escape(line)
            )
            .map_err(|e| Error::XmlError(e.to_string()))?;
        }
    }

    write!(xml, "<a:endParaRPr{}/>", props).map_err(|e| Error::XmlError(e.to_string()))?;
    xml.push_str("</a:p>");
    Ok(())
}

fn run_props_attrs(paragraph: &Paragraph) -> String {
    let mut attrs = String::from(r#" lang="en-US""#);
    if let Some(size) = paragraph.size {
        attrs.push_str(&format!(r#" sz="{}""#, size.centipoints()));
    }
    if let Some(bold) = paragraph.bold {
        attrs.push_str(if bold { r#" b="1""# } else { r#" b="0""# });
    }
    if let Some(italic) = paragraph.italic {
        attrs.push_str(if italic { r#" i="1""# } else { r#" i="0""# });
    }
    attrs.push_str(r#" dirty="0""#);
    attrs
}
