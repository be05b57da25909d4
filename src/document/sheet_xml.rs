//! ワークシートXMLの書き換え
//!
//! 行高さ（`<row ht customHeight>`）、列幅（`<cols>`）、描画への参照
//! （`<drawing r:id>`）だけを変更し、それ以外の要素と属性はそのまま流す。

use super::xml::{prefix_of, xml_error, REL_NS};
use crate::error::Result;
use image_to_excel_common::layout::col_width_to_xml;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

/// `<drawing>` より後ろに置かれるワークシートの子要素
const AFTER_DRAWING: &[&[u8]] = &[
    b"legacyDrawing",
    b"legacyDrawingHF",
    b"drawingHF",
    b"picture",
    b"oleObjects",
    b"controls",
    b"webPublishItems",
    b"tableParts",
    b"extLst",
];

fn is_after_drawing(local: &[u8]) -> bool {
    AFTER_DRAWING.iter().any(|name| *name == local)
}

/// ワークシートへの変更内容
#[derive(Debug, Default)]
pub(crate) struct SheetPatch {
    /// 行（0始まり） → 高さ(pt)
    pub row_heights: BTreeMap<u32, f64>,
    /// 列（0始まり） → 幅(文字数)
    pub col_widths: BTreeMap<u16, f64>,
    /// 新しく参照を追加する描画のリレーションID
    pub drawing_rel_id: Option<String>,
}

/// `<col>` 1件（min/max は1始まり）
#[derive(Debug, Clone, PartialEq)]
struct ColSpec {
    min: u32,
    max: u32,
    /// min/max 以外の属性（エスケープ済みの値）
    attrs: Vec<(String, String)>,
}

impl ColSpec {
    fn from_element(e: &BytesStart) -> Option<Self> {
        let mut min = None;
        let mut max = None;
        let mut attrs = Vec::new();
        for a in e.attributes().flatten() {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&a.value).into_owned();
            match key.as_str() {
                "min" => min = value.parse().ok(),
                "max" => max = value.parse().ok(),
                _ => attrs.push((key, value)),
            }
        }
        Some(Self { min: min?, max: max?, attrs })
    }

    fn with_range(&self, min: u32, max: u32) -> Self {
        Self { min, max, attrs: self.attrs.clone() }
    }

    fn set(&mut self, key: &str, value: String) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    fn to_xml(&self, prefix: &str) -> String {
        let mut xml = format!(r#"<{}col min="{}" max="{}""#, prefix, self.min, self.max);
        for (key, value) in &self.attrs {
            xml.push_str(&format!(r#" {}="{}""#, key, value));
        }
        xml.push_str("/>");
        xml
    }
}

/// 1列分の幅を適用する。既存の範囲にかかる場合は分割する
fn apply_col_width(specs: Vec<ColSpec>, col: u32, width: f64) -> Vec<ColSpec> {
    let width = col_width_to_xml(width).to_string();
    let mut out = Vec::with_capacity(specs.len() + 2);
    let mut covered = false;

    for spec in specs {
        if spec.min <= col && col <= spec.max {
            covered = true;
            if spec.min < col {
                out.push(spec.with_range(spec.min, col - 1));
            }
            let mut target = spec.with_range(col, col);
            target.set("width", width.clone());
            target.set("customWidth", "1".into());
            out.push(target);
            if col < spec.max {
                out.push(spec.with_range(col + 1, spec.max));
            }
        } else {
            out.push(spec);
        }
    }

    if !covered {
        out.push(ColSpec {
            min: col,
            max: col,
            attrs: vec![("width".into(), width), ("customWidth".into(), "1".into())],
        });
        out.sort_by_key(|s| s.min);
    }
    out
}

fn cols_xml(specs: Vec<ColSpec>, widths: &BTreeMap<u16, f64>, prefix: &str) -> String {
    let specs = widths
        .iter()
        .fold(specs, |specs, (col, width)| apply_col_width(specs, *col as u32 + 1, *width));
    let mut xml = format!("<{}cols>", prefix);
    for spec in &specs {
        xml.push_str(&spec.to_xml(prefix));
    }
    xml.push_str(&format!("</{}cols>", prefix));
    xml
}

fn new_row_xml(prefix: &str, row: u32, height: f64) -> String {
    format!(r#"<{}row r="{}" ht="{}" customHeight="1"/>"#, prefix, row, height)
}

fn drawing_xml(prefix: &str, rel_id: &str) -> String {
    format!(r#"<{}drawing xmlns:r="{}" r:id="{}"/>"#, prefix, REL_NS, rel_id)
}

/// 既存の `<row>` の ht/customHeight を差し替える
fn row_with_height(e: &BytesStart, height: f64) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut row = BytesStart::new(name);
    for a in e.attributes().flatten() {
        if matches!(a.key.as_ref(), b"ht" | b"customHeight") {
            continue;
        }
        row.push_attribute(a);
    }
    row.push_attribute(("ht", height.to_string().as_str()));
    row.push_attribute(("customHeight", "1"));
    row.into_owned()
}

fn row_number(e: &BytesStart) -> Option<u32> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"r")
        .and_then(|a| String::from_utf8_lossy(&a.value).parse().ok())
}

/// ワークシートXMLに変更を適用する
pub(crate) fn patch_worksheet(xml: &[u8], part: &str, patch: &SheetPatch) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 4096));
    let mut buf = Vec::new();

    // 1始まりの行番号 → 高さ
    let mut pending_rows: BTreeMap<u32, f64> =
        patch.row_heights.iter().map(|(row, height)| (row + 1, *height)).collect();
    let mut prefix = String::new();
    let mut depth = 0usize;
    let mut cols_done = patch.col_widths.is_empty();
    let mut in_cols = false;
    let mut col_specs = Vec::new();
    let mut last_row = 0u32;
    let mut drawing_done = patch.drawing_rel_id.is_none();

    macro_rules! emit {
        ($event:expr) => {
            writer.write_event($event).map_err(|e| xml_error(part, e))?
        };
    }
    macro_rules! raw {
        ($text:expr) => {
            writer.get_mut().extend_from_slice($text.as_bytes())
        };
    }

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))?;
        match event {
            Event::Eof => break,

            Event::Start(e) if in_cols => {
                depth += 1;
                if e.local_name().as_ref() == b"col" {
                    col_specs.extend(ColSpec::from_element(&e));
                }
            }
            Event::Empty(e) if in_cols => {
                if e.local_name().as_ref() == b"col" {
                    col_specs.extend(ColSpec::from_element(&e));
                }
            }

            Event::Start(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                if depth == 0 {
                    prefix = prefix_of(&e);
                } else if depth == 1 {
                    if !drawing_done && is_after_drawing(local) {
                        raw!(drawing_xml(&prefix, patch.drawing_rel_id.as_deref().unwrap_or_default()));
                        drawing_done = true;
                    }
                    if local == b"cols" && !cols_done {
                        in_cols = true;
                        depth += 1;
                        continue;
                    }
                    if local == b"sheetData" && !cols_done {
                        raw!(cols_xml(Vec::new(), &patch.col_widths, &prefix));
                        cols_done = true;
                    }
                } else if depth == 2 && local == b"row" {
                    let number = row_number(&e).unwrap_or(last_row + 1);
                    flush_rows_before(&mut pending_rows, number, &prefix, writer.get_mut());
                    last_row = number;
                    if let Some(height) = pending_rows.remove(&number) {
                        depth += 1;
                        emit!(Event::Start(row_with_height(&e, height)));
                        continue;
                    }
                }
                depth += 1;
                emit!(Event::Start(e));
            }

            Event::Empty(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                if depth == 1 {
                    if !drawing_done && is_after_drawing(local) {
                        raw!(drawing_xml(&prefix, patch.drawing_rel_id.as_deref().unwrap_or_default()));
                        drawing_done = true;
                    }
                    if local == b"cols" && !cols_done {
                        raw!(cols_xml(Vec::new(), &patch.col_widths, &prefix));
                        cols_done = true;
                        continue;
                    }
                    if local == b"sheetData" {
                        if !cols_done {
                            raw!(cols_xml(Vec::new(), &patch.col_widths, &prefix));
                            cols_done = true;
                        }
                        // 空の <sheetData/> は開閉タグに展開して行を入れる
                        let end = e.to_end().into_owned();
                        emit!(Event::Start(e));
                        flush_rows_before(&mut pending_rows, u32::MAX, &prefix, writer.get_mut());
                        emit!(Event::End(end));
                        continue;
                    }
                } else if depth == 2 && local == b"row" {
                    let number = row_number(&e).unwrap_or(last_row + 1);
                    flush_rows_before(&mut pending_rows, number, &prefix, writer.get_mut());
                    last_row = number;
                    if let Some(height) = pending_rows.remove(&number) {
                        emit!(Event::Empty(row_with_height(&e, height)));
                        continue;
                    }
                }
                emit!(Event::Empty(e));
            }

            Event::End(e) => {
                depth = depth.saturating_sub(1);
                let local = e.local_name();
                let local = local.as_ref();
                if in_cols {
                    if depth == 1 && local == b"cols" {
                        raw!(cols_xml(std::mem::take(&mut col_specs), &patch.col_widths, &prefix));
                        in_cols = false;
                        cols_done = true;
                    }
                    continue;
                }
                if depth == 1 && local == b"sheetData" {
                    flush_rows_before(&mut pending_rows, u32::MAX, &prefix, writer.get_mut());
                }
                if depth == 0 && !drawing_done {
                    raw!(drawing_xml(&prefix, patch.drawing_rel_id.as_deref().unwrap_or_default()));
                    drawing_done = true;
                }
                emit!(Event::End(e));
            }

            _ if in_cols => {}
            other => emit!(other),
        }
    }

    Ok(writer.into_inner())
}

/// `before` より小さい番号の未出力行を新しい `<row>` として書く
fn flush_rows_before(pending: &mut BTreeMap<u32, f64>, before: u32, prefix: &str, out: &mut Vec<u8>) {
    let rest = pending.split_off(&before);
    for (row, height) in std::mem::replace(pending, rest) {
        out.extend_from_slice(new_row_xml(prefix, row, height).as_bytes());
    }
}
