//! xlsxパッケージ（zip）への画像の追加
//!
//! 入力ファイルの全パートをそのまま出力へコピーし、対象シートに関係する
//! パートだけを書き換える。
//!
//! - 対象ワークシート: 行高さ・列幅・`<drawing>` 参照
//! - ワークシートの rels: 描画へのリレーション
//! - 描画パートとその rels: 画像のアンカー（既存の描画があれば追記）
//! - xl/media: 画像本体
//! - [Content_Types].xml: 画像拡張子と描画パートの型

use super::drawing::{anchor_xml, max_shape_id, new_drawing_xml};
use super::sheet_xml::{patch_worksheet, SheetPatch};
use super::xml::{
    attr, empty_relationships_xml, insert_before_root_end, next_rel_id, parse_relationships,
    prefixed_attr, relationship_xml, xml_error, REL_TYPE_DRAWING, REL_TYPE_IMAGE,
    REL_TYPE_OFFICE_DOCUMENT,
};
use super::SheetLayer;
use crate::error::{ImageToExcelError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = "[Content_Types].xml";
const DRAWING_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

fn package_error(context: impl std::fmt::Display, e: impl std::fmt::Display) -> ImageToExcelError {
    ImageToExcelError::ExcelWrite(format!("{}: {}", context, e))
}

/// パート名のディレクトリ部分（"xl/worksheets/sheet1.xml" → "xl/worksheets"）
fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// パートに対応する rels のパート名
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// リレーションのターゲットをパート名に解決する
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// `from_dir` から見た `to` の相対パス
pub(crate) fn relative_target(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|p| !p.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|p| !p.is_empty()).collect();
    let common = from
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments = vec![".."; from.len() - common];
    segments.extend(&to_parts[common..]);
    segments.join("/")
}

/// 既存パートと重ならない `<dir>/<stem>N.<ext>`
fn unique_part(names: &HashSet<String>, dir: &str, stem: &str, ext: &str) -> String {
    (1..)
        .map(|n| format!("{}/{}{}.{}", dir, stem, n, ext))
        .find(|name| !names.contains(&name.to_lowercase()))
        .unwrap_or_default()
}

struct SourcePackage {
    archive: ZipArchive<File>,
    /// 小文字化したパート名
    names: HashSet<String>,
}

impl SourcePackage {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| package_error(path.display(), e))?;
        let archive = ZipArchive::new(file).map_err(|e| package_error(path.display(), e))?;
        let names = archive.file_names().map(|n| n.to_lowercase()).collect();
        Ok(Self { archive, names })
    }

    fn read(&mut self, part: &str) -> Result<Option<Vec<u8>>> {
        if !self.names.contains(&part.to_lowercase()) {
            return Ok(None);
        }
        let mut file = self.archive.by_name(part).map_err(|e| package_error(part, e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| package_error(part, e))?;
        Ok(Some(data))
    }

    fn read_required(&mut self, part: &str) -> Result<Vec<u8>> {
        self.read(part)?
            .ok_or_else(|| package_error(part, "パートが見つかりません"))
    }

    fn relationships(&mut self, part: &str) -> Result<Vec<super::xml::Relationship>> {
        let rels_path = rels_path_for(part);
        match self.read(&rels_path)? {
            Some(xml) => parse_relationships(&xml, &rels_path),
            None => Ok(Vec::new()),
        }
    }

    /// 本体のワークブックパート（通常は xl/workbook.xml）
    fn workbook_part(&mut self) -> Result<String> {
        let rels = self.relationships("")?;
        Ok(rels
            .into_iter()
            .find(|r| r.rel_type == REL_TYPE_OFFICE_DOCUMENT)
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| "xl/workbook.xml".into()))
    }

    /// シート名からワークシートのパート名を引く
    fn worksheet_part(&mut self, sheet_name: &str) -> Result<String> {
        let workbook = self.workbook_part()?;
        let xml = self.read_required(&workbook)?;
        let rel_id = sheet_rel_id(&xml, &workbook, sheet_name)?
            .ok_or_else(|| ImageToExcelError::SheetNotFound(sheet_name.to_string()))?;

        self.relationships(&workbook)?
            .into_iter()
            .find(|r| r.id == rel_id)
            .map(|r| resolve_target(part_dir(&workbook), &r.target))
            .ok_or_else(|| package_error(&workbook, format!("{} のリレーションがありません", rel_id)))
    }
}

fn sheet_rel_id(workbook_xml: &[u8], part: &str, sheet_name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(workbook_xml);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Eof => return Ok(None),
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if attr(&e, b"name").as_deref() == Some(sheet_name) {
                    return Ok(prefixed_attr(&e, b"id"));
                }
            }
            _ => {}
        }
    }
}

/// `[Content_Types].xml` に登録済みの Default 拡張子（小文字）
fn default_extensions(xml: &[u8]) -> Result<HashSet<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut extensions = HashSet::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(CONTENT_TYPES, e))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Default" => {
                if let Some(ext) = attr(&e, b"Extension") {
                    extensions.insert(ext.to_lowercase());
                }
            }
            _ => {}
        }
    }
    Ok(extensions)
}

/// 入力パッケージに画像を加えた出力を書く
pub(crate) fn write_package(source: &Path, output: &Path, sheet_name: &str, layer: &SheetLayer) -> Result<()> {
    if let (Ok(a), Ok(b)) = (source.canonicalize(), output.canonicalize()) {
        if a == b {
            return Err(package_error(output.display(), "入力ファイルと同じパスには保存できません"));
        }
    }

    let mut package = SourcePackage::open(source)?;
    let mut names = package.names.clone();
    // 書き換え・追加するパート
    let mut parts: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    let sheet_part = package.worksheet_part(sheet_name)?;
    let sheet_xml = package.read_required(&sheet_part)?;
    let sheet_dir = part_dir(&sheet_part).to_string();

    let mut patch = SheetPatch {
        row_heights: layer.row_heights.clone(),
        col_widths: layer.col_widths.clone(),
        drawing_rel_id: None,
    };

    if !layer.images.is_empty() {
        let sheet_rels_path = rels_path_for(&sheet_part);
        let sheet_rels = package.relationships(&sheet_part)?;
        let existing_drawing = sheet_rels
            .iter()
            .find(|r| r.rel_type == REL_TYPE_DRAWING)
            .map(|r| resolve_target(&sheet_dir, &r.target));

        let drawing_part = match existing_drawing {
            Some(part) => part,
            None => {
                let part = unique_part(&names, "xl/drawings", "drawing", "xml");
                names.insert(part.to_lowercase());

                let ids: Vec<String> = sheet_rels.iter().map(|r| r.id.clone()).collect();
                let rel_id = next_rel_id(&ids);
                let rel = relationship_xml(&rel_id, REL_TYPE_DRAWING, &relative_target(&sheet_dir, &part));
                let rels_xml = package
                    .read(&sheet_rels_path)?
                    .unwrap_or_else(|| empty_relationships_xml().into_bytes());
                parts.insert(
                    sheet_rels_path.clone(),
                    insert_before_root_end(&rels_xml, &sheet_rels_path, &rel)?,
                );
                patch.drawing_rel_id = Some(rel_id);
                part
            }
        };

        let drawing_dir = part_dir(&drawing_part).to_string();
        let drawing_rels_path = rels_path_for(&drawing_part);
        let drawing_xml = package.read(&drawing_part)?;
        let mut rel_ids: Vec<String> = package
            .relationships(&drawing_part)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let mut shape_id = match &drawing_xml {
            Some(xml) => max_shape_id(xml, &drawing_part)?,
            None => 0,
        };

        let mut anchors = String::new();
        let mut rels = String::new();
        let mut extensions = HashSet::new();
        for (cell, placement) in &layer.images {
            let media = unique_part(&names, "xl/media", "image", placement.extension);
            names.insert(media.to_lowercase());

            let rel_id = next_rel_id(&rel_ids);
            rel_ids.push(rel_id.clone());
            rels.push_str(&relationship_xml(&rel_id, REL_TYPE_IMAGE, &relative_target(&drawing_dir, &media)));

            shape_id += 1;
            let descr = media.rsplit('/').next().unwrap_or_default().to_string();
            anchors.push_str(&anchor_xml(*cell, placement, &rel_id, shape_id, &descr));

            extensions.insert(placement.extension);
            parts.insert(media, placement.data.clone());
        }

        let drawing_out = match drawing_xml {
            Some(xml) => insert_before_root_end(&xml, &drawing_part, &anchors)?,
            None => new_drawing_xml(&anchors).into_bytes(),
        };
        parts.insert(drawing_part.clone(), drawing_out);

        let drawing_rels = package
            .read(&drawing_rels_path)?
            .unwrap_or_else(|| empty_relationships_xml().into_bytes());
        parts.insert(
            drawing_rels_path.clone(),
            insert_before_root_end(&drawing_rels, &drawing_rels_path, &rels)?,
        );

        // [Content_Types].xml
        let types_xml = package.read_required(CONTENT_TYPES)?;
        let registered = default_extensions(&types_xml)?;
        let mut additions = String::new();
        let mut extensions: Vec<&str> = extensions.into_iter().collect();
        extensions.sort_unstable();
        for ext in extensions {
            if !registered.contains(ext) {
                additions.push_str(&format!(
                    r#"<Default Extension="{}" ContentType="{}"/>"#,
                    ext,
                    content_type_for(ext)
                ));
            }
        }
        if patch.drawing_rel_id.is_some() {
            additions.push_str(&format!(
                r#"<Override PartName="/{}" ContentType="{}"/>"#,
                drawing_part, DRAWING_CONTENT_TYPE
            ));
        }
        if !additions.is_empty() {
            parts.insert(
                CONTENT_TYPES.to_string(),
                insert_before_root_end(&types_xml, CONTENT_TYPES, &additions)?,
            );
        }

        debug!(sheet = %sheet_part, drawing = %drawing_part, images = layer.images.len(), "描画パートを追加");
    }

    parts.insert(sheet_part.clone(), patch_worksheet(&sheet_xml, &sheet_part, &patch)?);

    write_zip(&mut package.archive, output, parts)
}

fn write_zip(archive: &mut ZipArchive<File>, output: &Path, mut parts: BTreeMap<String, Vec<u8>>) -> Result<()> {
    let file = File::create(output).map_err(|e| package_error(output.display(), e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| package_error(output.display(), e))?;
        let name = entry.name().to_string();
        match parts.remove(&name) {
            Some(data) => {
                drop(entry);
                zip.start_file(name.as_str(), options)
                    .map_err(|e| package_error(&name, e))?;
                zip.write_all(&data).map_err(|e| package_error(&name, e))?;
            }
            None => zip.raw_copy_file(entry).map_err(|e| package_error(&name, e))?,
        }
    }

    // 新しく追加したパート
    for (name, data) in parts {
        zip.start_file(name.as_str(), options)
            .map_err(|e| package_error(&name, e))?;
        zip.write_all(&data).map_err(|e| package_error(&name, e))?;
    }

    zip.finish().map_err(|e| package_error(output.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("xl/worksheets/sheet1.xml"), "xl/worksheets/_rels/sheet1.xml.rels");
        assert_eq!(rels_path_for(""), "_rels/.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("xl", "worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_target("xl/worksheets", "../drawings/drawing1.xml"), "xl/drawings/drawing1.xml");
        assert_eq!(resolve_target("xl", "/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(relative_target("xl/worksheets", "xl/drawings/drawing1.xml"), "../drawings/drawing1.xml");
        assert_eq!(relative_target("xl/drawings", "xl/media/image3.png"), "../media/image3.png");
        assert_eq!(relative_target("xl", "xl/media/image1.png"), "media/image1.png");
    }

    #[test]
    fn test_unique_part() {
        let names: HashSet<String> = ["xl/media/image1.png", "xl/media/image2.jpeg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_part(&names, "xl/media", "image", "png"), "xl/media/image2.png");
        assert_eq!(unique_part(&names, "xl/drawings", "drawing", "xml"), "xl/drawings/drawing1.xml");
    }

    #[test]
    fn test_sheet_rel_id() {
        let xml = r#"<workbook xmlns:r="r"><sheets>
            <sheet name="一覧" sheetId="1" r:id="rId1"/>
            <sheet name="A&amp;B" sheetId="2" r:id="rId2"/>
        </sheets></workbook>"#
            .as_bytes();
        assert_eq!(sheet_rel_id(xml, "w", "A&B").unwrap().as_deref(), Some("rId2"));
        assert_eq!(sheet_rel_id(xml, "w", "Missing").unwrap(), None);
    }

    #[test]
    fn test_default_extensions() {
        let xml = br#"<Types><Default Extension="XML" ContentType="a"/><Default Extension="png" ContentType="b"/></Types>"#;
        let extensions = default_extensions(xml).unwrap();
        assert!(extensions.contains("xml"));
        assert!(extensions.contains("png"));
        assert!(!extensions.contains("jpeg"));
    }
}
