//! A1: `.pptx` package (ZIP container) I/O.
//!
//! Built on the `zip` crate for in-memory container access, generalized to
//! support writing a modified package back out rather than only reading it.
//! Slide ordering is read
//! from `ppt/presentation.xml`'s `<p:sldIdLst>`, resolved through
//! `ppt/_rels/presentation.xml.rels`.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::RenderError;
use crate::xml::{self, XmlElement};

const PRESENTATION_PATH: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PATH: &str = "ppt/_rels/presentation.xml.rels";
const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
const RELS_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

/// A loaded `.pptx` container: every ZIP entry kept as raw bytes, mutated
/// in place as parts are rewritten.
pub struct PptxPackage {
    entries: BTreeMap<String, Vec<u8>>,
}

impl PptxPackage {
    pub fn open(bytes: &[u8]) -> Result<Self, RenderError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| RenderError::Package(e.to_string()))?;
        let mut entries = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| RenderError::Package(e.to_string()))?;
            if file.is_dir() {
                continue;
            }
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            entries.insert(file.name().to_string(), buf);
        }
        Ok(Self { entries })
    }

    pub fn part(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(|v| v.as_slice())
    }

    pub fn set_part(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(path.into(), bytes);
    }

    pub fn parse_part(&self, path: &str) -> Result<XmlElement, RenderError> {
        let bytes = self
            .part(path)
            .ok_or_else(|| RenderError::Package(format!("missing part: {path}")))?;
        xml::parse(bytes)
    }

    pub fn write_part(&mut self, path: &str, el: &XmlElement) -> Result<(), RenderError> {
        let bytes = xml::serialize(el)?;
        self.set_part(path, bytes);
        Ok(())
    }

    /// Ordered list of slide part paths, resolved via presentation.xml's
    /// `<p:sldIdLst>` and the presentation-level relationships part.
    pub fn slide_paths(&self) -> Result<Vec<String>, RenderError> {
        let presentation = self.parse_part(PRESENTATION_PATH)?;
        let rels = self.parse_part(PRESENTATION_RELS_PATH)?;
        let rid_to_target = relationship_targets(&rels);

        let sld_id_lst = presentation
            .find_all("p:sldIdLst")
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::Package("presentation.xml has no sldIdLst".to_string()))?;

        let mut paths = Vec::new();
        for sld_id in sld_id_lst.children_named("p:sldId") {
            let rid = sld_id
                .attr("r:id")
                .ok_or_else(|| RenderError::Package("sldId missing r:id".to_string()))?;
            let target = rid_to_target.get(rid).ok_or_else(|| {
                RenderError::Package(format!("dangling slide relationship id {rid}"))
            })?;
            paths.push(normalize_ppt_relative(target));
        }
        Ok(paths)
    }

    /// The `.rels` part for a given slide, if present.
    pub fn slide_rels_path(&self, slide_path: &str) -> String {
        rels_path_for(slide_path)
    }

    /// Duplicate a slide part (and its `.rels`, if any) under a brand-new
    /// path, registering it in `[Content_Types].xml`. Does not touch slide
    /// ordering — call [`PptxPackage::set_slide_order`] once the full plan
    /// is known.
    pub fn duplicate_slide_part(&mut self, source_path: &str) -> Result<String, RenderError> {
        let next_index = self.next_slide_index();
        let new_path = format!("ppt/slides/slide{next_index}.xml");
        let source_bytes = self
            .part(source_path)
            .ok_or_else(|| RenderError::Package(format!("missing part: {source_path}")))?
            .to_vec();
        self.set_part(new_path.clone(), source_bytes);

        let source_rels = rels_path_for(source_path);
        if let Some(rels_bytes) = self.part(&source_rels).map(|b| b.to_vec()) {
            self.set_part(rels_path_for(&new_path), rels_bytes);
        }

        self.register_slide_content_type(&new_path)?;
        Ok(new_path)
    }

    fn next_slide_index(&self) -> u32 {
        self.entries
            .keys()
            .filter_map(|k| {
                k.strip_prefix("ppt/slides/slide")?
                    .strip_suffix(".xml")?
                    .parse::<u32>()
                    .ok()
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    fn register_slide_content_type(&mut self, path: &str) -> Result<(), RenderError> {
        let mut content_types = self.parse_part(CONTENT_TYPES_PATH)?;
        let mut override_el = XmlElement::new("Override");
        override_el.set_attr("PartName", format!("/{path}"));
        override_el.set_attr("ContentType", SLIDE_CONTENT_TYPE);
        content_types
            .children
            .push(crate::xml::XmlNode::Element(override_el));
        self.write_part(CONTENT_TYPES_PATH, &content_types)
    }

    /// Rewrite `<p:sldIdLst>` (and the relationships it depends on) so that
    /// the presentation's slide order is exactly `order` (a list of part
    /// paths, each of which must already exist). Existing slides keep a
    /// stable (freshly numbered) relationship id; this is simpler than
    /// preserving the original ids and equally valid OOXML.
    pub fn set_slide_order(&mut self, order: &[String]) -> Result<(), RenderError> {
        let mut rels = self.parse_part(PRESENTATION_RELS_PATH)?;
        rels.children
            .retain(|c| !matches!(c, crate::xml::XmlNode::Element(e) if e.name == "Relationship" && e.attr("Type").map(|t| t.ends_with("/slide")).unwrap_or(false)));

        let mut sld_id_lst = XmlElement::new("p:sldIdLst");
        let mut next_rid = next_relationship_index(&rels);
        let mut next_sld_id = 256u32;

        for path in order {
            let rid = format!("rId{next_rid}");
            next_rid += 1;
            let mut rel = XmlElement::new("Relationship");
            rel.set_attr("Id", rid.clone());
            rel.set_attr("Type", format!("{RELS_NS}/slide"));
            rel.set_attr("Target", format!("slides/{}", part_file_name(path)));
            rels.children.push(crate::xml::XmlNode::Element(rel));

            let mut sld_id = XmlElement::new("p:sldId");
            sld_id.set_attr("id", next_sld_id.to_string());
            sld_id.set_attr("r:id", rid);
            next_sld_id += 1;
            sld_id_lst.children.push(crate::xml::XmlNode::Element(sld_id));
        }

        self.write_part(PRESENTATION_RELS_PATH, &rels)?;

        let mut presentation = self.parse_part(PRESENTATION_PATH)?;
        replace_child(&mut presentation, "p:sldIdLst", sld_id_lst);
        self.write_part(PRESENTATION_PATH, &presentation)
    }

    /// Resolve a relationship id declared by `part_path`'s `.rels` part to
    /// a package-root-relative part path (e.g. a slide's chart reference,
    /// `../charts/chart1.xml`, resolves to `ppt/charts/chart1.xml`).
    pub fn resolve_relationship_target(
        &self,
        part_path: &str,
        rid: &str,
    ) -> Result<Option<String>, RenderError> {
        let rels_path = rels_path_for(part_path);
        let Some(bytes) = self.part(&rels_path) else {
            return Ok(None);
        };
        let rels = xml::parse(bytes)?;
        let target = rels
            .children_named("Relationship")
            .find(|r| r.attr("Id") == Some(rid))
            .and_then(|r| r.attr("Target").map(|t| t.to_string()));
        Ok(target.map(|t| resolve_relative(part_path, &t)))
    }

    /// Serialize back to a ZIP byte stream.
    pub fn save(&self) -> Result<Vec<u8>, RenderError> {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut buf);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (path, bytes) in &self.entries {
            writer
                .start_file(path, options)
                .map_err(|e| RenderError::Package(e.to_string()))?;
            writer.write_all(bytes)?;
        }
        writer
            .finish()
            .map_err(|e| RenderError::Package(e.to_string()))?;
        Ok(buf.into_inner())
    }
}

fn relationship_targets(rels: &XmlElement) -> BTreeMap<String, String> {
    rels.children_named("Relationship")
        .filter_map(|rel| Some((rel.attr("Id")?.to_string(), rel.attr("Target")?.to_string())))
        .collect()
}

fn next_relationship_index(rels: &XmlElement) -> u32 {
    rels.children_named("Relationship")
        .filter_map(|rel| rel.attr("Id")?.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

fn normalize_ppt_relative(target: &str) -> String {
    if let Some(stripped) = target.strip_prefix("/ppt/") {
        format!("ppt/{stripped}")
    } else if target.starts_with("ppt/") {
        target.to_string()
    } else {
        format!("ppt/{target}")
    }
}

fn part_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn rels_path_for(part_path: &str) -> String {
    let (dir, file) = part_path
        .rsplit_once('/')
        .unwrap_or(("", part_path));
    if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    }
}

/// Resolve `target` (a `.rels` `Target` attribute, package-root-absolute
/// when it starts with `/`, otherwise relative to `part_path`'s directory)
/// to a package-root-relative path, collapsing `..` segments.
fn resolve_relative(part_path: &str, target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        return stripped.to_string();
    }
    let base_dir = part_path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn replace_child(parent: &mut XmlElement, name: &str, new_child: XmlElement) {
    if let Some(pos) = parent
        .children
        .iter()
        .position(|c| matches!(c, crate::xml::XmlNode::Element(e) if e.name == name))
    {
        parent.children[pos] = crate::xml::XmlNode::Element(new_child);
    } else {
        parent.children.push(crate::xml::XmlNode::Element(new_child));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_path_for_top_level_part() {
        assert_eq!(rels_path_for("ppt/presentation.xml"), "ppt/_rels/presentation.xml.rels");
    }

    #[test]
    fn rels_path_for_slide_part() {
        assert_eq!(
            rels_path_for("ppt/slides/slide3.xml"),
            "ppt/slides/_rels/slide3.xml.rels"
        );
    }

    #[test]
    fn normalize_target_variants() {
        assert_eq!(normalize_ppt_relative("slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(normalize_ppt_relative("/ppt/slides/slide1.xml"), "ppt/slides/slide1.xml");
    }

    #[test]
    fn part_file_name_strips_directory() {
        assert_eq!(part_file_name("ppt/slides/slide2.xml"), "slide2.xml");
    }

    #[test]
    fn resolve_relative_target_walks_up_a_directory() {
        assert_eq!(
            resolve_relative("ppt/slides/slide1.xml", "../charts/chart1.xml"),
            "ppt/charts/chart1.xml"
        );
    }

    #[test]
    fn resolve_relative_target_honors_absolute_path() {
        assert_eq!(
            resolve_relative("ppt/slides/slide1.xml", "/ppt/media/image1.png"),
            "ppt/media/image1.png"
        );
    }
}
