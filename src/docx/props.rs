//! Mapping between semantic formatting fields and `w:pPr` / `w:rPr` markup.
//!
//! The same rules serve three callers: the parser reads fields out of properties
//! elements, the renderer synthesizes properties from fields when no shadow exists, and
//! the merge step patches a shadow so it reflects exactly the fields an agent changed.

use crate::ast::{Alignment, ParagraphFormat, RunFormat};
use crate::units::{parse_half_points, parse_twips};

use super::xml::{XmlElement, XmlNode};

/// Schema sequence of `CT_PPr` children.
pub const PPR_ORDER: &[&str] = &[
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

/// Schema sequence of `CT_RPr` children.
pub const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

pub const TBLPR_ORDER: &[&str] = &[
    "w:tblStyle",
    "w:tblpPr",
    "w:tblOverlap",
    "w:bidiVisual",
    "w:tblStyleRowBandSize",
    "w:tblStyleColBandSize",
    "w:tblW",
    "w:jc",
    "w:tblCellSpacing",
    "w:tblInd",
    "w:tblBorders",
    "w:shd",
    "w:tblLayout",
    "w:tblCellMar",
    "w:tblLook",
    "w:tblCaption",
    "w:tblDescription",
    "w:tblPrChange",
];

pub const TCPR_ORDER: &[&str] = &[
    "w:cnfStyle",
    "w:tcW",
    "w:gridSpan",
    "w:hMerge",
    "w:vMerge",
    "w:tcBorders",
    "w:shd",
    "w:noWrap",
    "w:tcMar",
    "w:textDirection",
    "w:tcFitText",
    "w:vAlign",
    "w:hideMark",
    "w:headers",
    "w:cellIns",
    "w:cellDel",
    "w:cellMerge",
    "w:tcPrChange",
];

/// Inserts `child` at its schema position. Unknown names go before a trailing
/// `*Change` element, or last.
pub fn insert_ordered(parent: &mut XmlElement, child: XmlElement, order: &[&str]) {
    let rank = |name: &str| order.iter().position(|n| *n == name);
    let idx = match rank(&child.name) {
        Some(r) => parent.children.iter().position(|c| {
            matches!(c, XmlNode::Element(el) if rank(&el.name).is_some_and(|er| er > r))
        }),
        None => parent
            .children
            .iter()
            .position(|c| matches!(c, XmlNode::Element(el) if el.name.ends_with("Change"))),
    }
    .unwrap_or(parent.children.len());
    parent.children.insert(idx, XmlNode::Element(child));
}

/// Replaces (or inserts) the child called `child.name`.
pub fn replace_ordered(parent: &mut XmlElement, child: XmlElement, order: &[&str]) {
    parent.remove_children(&child.name);
    insert_ordered(parent, child, order);
}

fn edit_child(
    parent: &mut XmlElement,
    name: &str,
    order: &[&str],
    edit: impl FnOnce(&mut XmlElement),
) {
    if !parent.has_child(name) {
        insert_ordered(parent, XmlElement::new(name), order);
    }
    if let Some(el) = parent.child_mut(name) {
        edit(el);
    }
}

fn prune_if_bare(parent: &mut XmlElement, name: &str) {
    if parent
        .child(name)
        .is_some_and(|el| el.attrs.is_empty() && el.children.is_empty())
    {
        parent.remove_children(name);
    }
}

/// Reads a `ST_OnOff` toggle (`w:b`, `w:i`, ...): present without value means on.
pub fn on_off(el: &XmlElement) -> bool {
    match el.attr("w:val") {
        None => true,
        Some(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "none"
        ),
    }
}

fn parse_int(el: &XmlElement, attr: &str) -> Option<i64> {
    el.attr(attr).and_then(parse_twips)
}

pub fn paragraph_format_from_ppr(ppr: &XmlElement) -> ParagraphFormat {
    let mut fmt = ParagraphFormat {
        alignment: ppr
            .child_attr("w:jc", "w:val")
            .and_then(|v| Alignment::from_jc(v.trim())),
        ..Default::default()
    };
    if let Some(ind) = ppr.child("w:ind") {
        fmt.indent_left = parse_int(ind, "w:left").or_else(|| parse_int(ind, "w:start"));
        fmt.indent_right = parse_int(ind, "w:right").or_else(|| parse_int(ind, "w:end"));
        fmt.indent_first_line = parse_int(ind, "w:firstLine")
            .or_else(|| parse_int(ind, "w:hanging").map(i64::saturating_neg));
    }
    if let Some(spacing) = ppr.child("w:spacing") {
        fmt.space_before = parse_int(spacing, "w:before");
        fmt.space_after = parse_int(spacing, "w:after");
    }
    fmt
}

/// Reads run fields. Theme-referenced colors are skipped when `skip_theme_color` is set.
pub fn run_format_from_rpr(rpr: &XmlElement, skip_theme_color: bool) -> RunFormat {
    let mut fmt = RunFormat {
        bold: rpr.child("w:b").map(on_off),
        italic: rpr.child("w:i").map(on_off),
        underline: rpr.child("w:u").map(|u| {
            !matches!(u.attr("w:val").map(str::trim), Some("none") | Some("0"))
        }),
        size: rpr
            .child("w:sz")
            .and_then(|sz| sz.attr("w:val"))
            .and_then(parse_half_points),
        ..Default::default()
    };
    if let Some(color) = rpr.child("w:color") {
        let themed = color.attr("w:themeColor").is_some();
        if !(skip_theme_color && themed) {
            fmt.color = color
                .attr("w:val")
                .map(str::trim)
                .filter(|v| v.len() == 6 && v.chars().all(|c| c.is_ascii_hexdigit()))
                .map(|v| format!("#{}", v.to_ascii_uppercase()));
        }
    }
    if let Some(fonts) = rpr.child("w:rFonts") {
        fmt.font_ascii = fonts.attr_value("w:ascii").filter(|v| !v.is_empty());
        fmt.font_east_asia = fonts.attr_value("w:eastAsia").filter(|v| !v.is_empty());
    }
    fmt
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParagraphChange {
    Alignment(Option<Alignment>),
    IndentLeft(Option<i64>),
    IndentRight(Option<i64>),
    IndentFirstLine(Option<i64>),
    SpaceBefore(Option<i64>),
    SpaceAfter(Option<i64>),
}

impl ParagraphChange {
    /// Tracked fields whose value differs between `orig` and `edited`.
    pub fn diff(orig: &ParagraphFormat, edited: &ParagraphFormat) -> Vec<Self> {
        let mut out = Vec::new();
        if orig.alignment != edited.alignment {
            out.push(Self::Alignment(edited.alignment));
        }
        if orig.indent_left != edited.indent_left {
            out.push(Self::IndentLeft(edited.indent_left));
        }
        if orig.indent_right != edited.indent_right {
            out.push(Self::IndentRight(edited.indent_right));
        }
        if orig.indent_first_line != edited.indent_first_line {
            out.push(Self::IndentFirstLine(edited.indent_first_line));
        }
        if orig.space_before != edited.space_before {
            out.push(Self::SpaceBefore(edited.space_before));
        }
        if orig.space_after != edited.space_after {
            out.push(Self::SpaceAfter(edited.space_after));
        }
        out
    }

    /// Every field set on `fmt`, as changes from an empty format.
    pub fn all(fmt: &ParagraphFormat) -> Vec<Self> {
        Self::diff(&ParagraphFormat::default(), fmt)
    }

    pub fn apply_to(&self, fmt: &mut ParagraphFormat) {
        match *self {
            Self::Alignment(v) => fmt.alignment = v,
            Self::IndentLeft(v) => fmt.indent_left = v,
            Self::IndentRight(v) => fmt.indent_right = v,
            Self::IndentFirstLine(v) => fmt.indent_first_line = v,
            Self::SpaceBefore(v) => fmt.space_before = v,
            Self::SpaceAfter(v) => fmt.space_after = v,
        }
    }
}

fn set_or_clear(el: &mut XmlElement, attr: &str, value: Option<i64>) {
    match value {
        Some(v) => el.set_attr(attr, &v.to_string()),
        None => {
            el.remove_attr(attr);
        }
    }
}

/// Writes `changes` into a `w:pPr` element, touching nothing else.
pub fn patch_ppr(ppr: &mut XmlElement, changes: &[ParagraphChange]) {
    for change in changes {
        match change {
            ParagraphChange::Alignment(None) => {
                ppr.remove_children("w:jc");
            }
            ParagraphChange::Alignment(Some(a)) => {
                edit_child(ppr, "w:jc", PPR_ORDER, |jc| jc.set_attr("w:val", a.to_jc()));
            }
            ParagraphChange::IndentLeft(v) => {
                edit_child(ppr, "w:ind", PPR_ORDER, |ind| {
                    let attr = if ind.attr("w:start").is_some() { "w:start" } else { "w:left" };
                    set_or_clear(ind, attr, *v);
                });
                prune_if_bare(ppr, "w:ind");
            }
            ParagraphChange::IndentRight(v) => {
                edit_child(ppr, "w:ind", PPR_ORDER, |ind| {
                    let attr = if ind.attr("w:end").is_some() { "w:end" } else { "w:right" };
                    set_or_clear(ind, attr, *v);
                });
                prune_if_bare(ppr, "w:ind");
            }
            ParagraphChange::IndentFirstLine(v) => {
                edit_child(ppr, "w:ind", PPR_ORDER, |ind| {
                    ind.remove_attr("w:firstLine");
                    ind.remove_attr("w:hanging");
                    match *v {
                        Some(n) if n < 0 => ind.set_attr("w:hanging", &(-n).to_string()),
                        Some(n) => ind.set_attr("w:firstLine", &n.to_string()),
                        None => {}
                    }
                });
                prune_if_bare(ppr, "w:ind");
            }
            ParagraphChange::SpaceBefore(v) => {
                edit_child(ppr, "w:spacing", PPR_ORDER, |sp| set_or_clear(sp, "w:before", *v));
                prune_if_bare(ppr, "w:spacing");
            }
            ParagraphChange::SpaceAfter(v) => {
                edit_child(ppr, "w:spacing", PPR_ORDER, |sp| set_or_clear(sp, "w:after", *v));
                prune_if_bare(ppr, "w:spacing");
            }
        }
    }
}

pub fn synthesize_ppr(fmt: &ParagraphFormat) -> XmlElement {
    let mut ppr = XmlElement::new("w:pPr");
    patch_ppr(&mut ppr, &ParagraphChange::all(fmt));
    ppr
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunChange {
    FontAscii(Option<String>),
    FontEastAsia(Option<String>),
    Size(Option<u32>),
    Bold(Option<bool>),
    Italic(Option<bool>),
    Underline(Option<bool>),
    Color(Option<String>),
}

impl RunChange {
    pub fn diff(orig: &RunFormat, edited: &RunFormat) -> Vec<Self> {
        let mut out = Vec::new();
        if orig.font_ascii != edited.font_ascii {
            out.push(Self::FontAscii(edited.font_ascii.clone()));
        }
        if orig.font_east_asia != edited.font_east_asia {
            out.push(Self::FontEastAsia(edited.font_east_asia.clone()));
        }
        if orig.size != edited.size {
            out.push(Self::Size(edited.size));
        }
        if orig.bold != edited.bold {
            out.push(Self::Bold(edited.bold));
        }
        if orig.italic != edited.italic {
            out.push(Self::Italic(edited.italic));
        }
        if orig.underline != edited.underline {
            out.push(Self::Underline(edited.underline));
        }
        if orig.color != edited.color {
            out.push(Self::Color(edited.color.clone()));
        }
        out
    }

    pub fn all(fmt: &RunFormat) -> Vec<Self> {
        Self::diff(&RunFormat::default(), fmt)
    }

    pub fn apply_to(&self, fmt: &mut RunFormat) {
        match self {
            Self::FontAscii(v) => fmt.font_ascii = v.clone(),
            Self::FontEastAsia(v) => fmt.font_east_asia = v.clone(),
            Self::Size(v) => fmt.size = *v,
            Self::Bold(v) => fmt.bold = *v,
            Self::Italic(v) => fmt.italic = *v,
            Self::Underline(v) => fmt.underline = *v,
            Self::Color(v) => fmt.color = v.clone(),
        }
    }
}

fn set_marker(rpr: &mut XmlElement, name: &str, on: bool) {
    if on {
        edit_child(rpr, name, RPR_ORDER, |el| {
            el.remove_attr("w:val");
        });
    } else {
        rpr.remove_children(name);
    }
}

/// Writes `changes` into a `w:rPr` element, touching nothing else.
pub fn patch_rpr(rpr: &mut XmlElement, changes: &[RunChange]) {
    for change in changes {
        match change {
            RunChange::FontAscii(v) => {
                edit_child(rpr, "w:rFonts", RPR_ORDER, |fonts| match v {
                    Some(name) => {
                        fonts.set_attr("w:ascii", name);
                        fonts.set_attr("w:hAnsi", name);
                        fonts.remove_attr("w:asciiTheme");
                        fonts.remove_attr("w:hAnsiTheme");
                    }
                    None => {
                        fonts.remove_attr("w:ascii");
                        fonts.remove_attr("w:hAnsi");
                    }
                });
                prune_if_bare(rpr, "w:rFonts");
            }
            RunChange::FontEastAsia(v) => {
                edit_child(rpr, "w:rFonts", RPR_ORDER, |fonts| match v {
                    Some(name) => {
                        fonts.set_attr("w:eastAsia", name);
                        fonts.remove_attr("w:eastAsiaTheme");
                    }
                    None => {
                        fonts.remove_attr("w:eastAsia");
                    }
                });
                prune_if_bare(rpr, "w:rFonts");
            }
            RunChange::Size(None) => {
                rpr.remove_children("w:sz");
                rpr.remove_children("w:szCs");
            }
            RunChange::Size(Some(half_points)) => {
                let val = half_points.to_string();
                for name in ["w:sz", "w:szCs"] {
                    edit_child(rpr, name, RPR_ORDER, |el| el.set_attr("w:val", &val));
                }
            }
            RunChange::Bold(v) => set_marker(rpr, "w:b", v.unwrap_or(false)),
            RunChange::Italic(v) => set_marker(rpr, "w:i", v.unwrap_or(false)),
            RunChange::Underline(Some(true)) => {
                edit_child(rpr, "w:u", RPR_ORDER, |u| {
                    let keep = u
                        .attr("w:val")
                        .is_some_and(|v| !matches!(v.trim(), "none" | "0"));
                    if !keep {
                        u.set_attr("w:val", "single");
                    }
                });
            }
            RunChange::Underline(_) => {
                rpr.remove_children("w:u");
            }
            RunChange::Color(None) => {
                rpr.remove_children("w:color");
            }
            RunChange::Color(Some(hex)) => {
                let val = hex.trim_start_matches('#').to_ascii_uppercase();
                edit_child(rpr, "w:color", RPR_ORDER, |c| {
                    c.set_attr("w:val", &val);
                    c.remove_attr("w:themeColor");
                    c.remove_attr("w:themeShade");
                    c.remove_attr("w:themeTint");
                });
            }
        }
    }
}

/// Builds a `w:rPr` from fields. Unlike a patch, an explicit `false` toggle is written
/// as `w:val="0"` so that it still overrides a style that turns the property on.
pub fn synthesize_rpr(fmt: &RunFormat) -> XmlElement {
    let mut rpr = XmlElement::new("w:rPr");
    patch_rpr(&mut rpr, &RunChange::all(fmt));
    for (value, name, off) in [
        (fmt.bold, "w:b", "0"),
        (fmt.italic, "w:i", "0"),
        (fmt.underline, "w:u", "none"),
    ] {
        if value == Some(false) {
            replace_ordered(
                &mut rpr,
                XmlElement::new(name).with_attr("w:val", off),
                RPR_ORDER,
            );
        }
    }
    rpr
}
