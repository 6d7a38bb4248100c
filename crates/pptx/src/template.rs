//! Fixed parts of every written package.
//!
//! The output deck always uses one master, one blank layout and one theme,
//! so these parts never depend on the source.

/// Slide master with an empty shape tree and plain text styles.
pub fn slide_master_xml() -> &'static str {
    include_str!("../resources/slideMaster1.xml")
}

/// The blank layout every output slide is based on. It has no placeholders.
pub fn blank_layout_xml() -> &'static str {
    include_str!("../resources/slideLayout1.xml")
}

/// Default theme. Text without an explicit color takes `tx1` from here.
pub fn theme_xml() -> &'static str {
    include_str!("../resources/theme1.xml")
}

pub fn pres_props_xml() -> &'static str {
    include_str!("../resources/presProps.xml")
}

pub fn view_props_xml() -> &'static str {
    include_str!("../resources/viewProps.xml")
}

pub fn table_styles_xml() -> &'static str {
    include_str!("../resources/tableStyles.xml")
}

pub fn core_props_xml() -> &'static str {
    include_str!("../resources/core.xml")
}
