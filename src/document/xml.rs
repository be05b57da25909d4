//! パッケージ内XMLの読み書きヘルパー（quick-xml）

use crate::error::{ImageToExcelError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;

pub(crate) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub(crate) const REL_TYPE_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
pub(crate) const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub(crate) const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

pub(crate) fn xml_error(part: &str, e: impl Display) -> ImageToExcelError {
    ImageToExcelError::ExcelWrite(format!("{}: {}", part, e))
}

/// 修飾名そのままで属性値を取り出す（`r:id` など）
pub(crate) fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| {
            let raw = String::from_utf8_lossy(&a.value).into_owned();
            quick_xml::escape::unescape(&raw).ok().map(|v| v.into_owned())
        })
}

/// 接頭辞付きでローカル名が一致する属性（`r:id`、`x:id` どちらでも）
pub(crate) fn prefixed_attr(e: &BytesStart, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == local)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// 要素の修飾名から接頭辞（"x:" / ""）を取り出す
pub(crate) fn prefix_of(e: &BytesStart) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

/// ルート要素の閉じタグ直前に断片を差し込む
pub(crate) fn insert_before_root_end(xml: &[u8], part: &str, fragment: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + fragment.len()));
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e)).map_err(|e| xml_error(part, e))?;
            }
            Event::End(e) => {
                if depth == 1 {
                    writer.get_mut().extend_from_slice(fragment.as_bytes());
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e)).map_err(|e| xml_error(part, e))?;
            }
            Event::Empty(e) if depth == 0 => {
                // 子要素のないルート（<Relationships/> 等）
                let end = e.to_end().into_owned();
                writer.write_event(Event::Start(e)).map_err(|e| xml_error(part, e))?;
                writer.get_mut().extend_from_slice(fragment.as_bytes());
                writer.write_event(Event::End(end)).map_err(|e| xml_error(part, e))?;
            }
            other => writer.write_event(other).map_err(|e| xml_error(part, e))?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// リレーションシップ1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

pub(crate) fn parse_relationships(xml: &[u8], part: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.push(Relationship {
                        id,
                        rel_type: attr(&e, b"Type").unwrap_or_default(),
                        target,
                    });
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// 既存と重ならない `rIdN`
pub(crate) fn next_rel_id(existing: &[String]) -> String {
    let max = existing
        .iter()
        .filter_map(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

pub(crate) fn relationship_xml(id: &str, rel_type: &str, target: &str) -> String {
    format!(
        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
        quick_xml::escape::escape(id),
        rel_type,
        quick_xml::escape::escape(target)
    )
}

pub(crate) fn empty_relationships_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{}"></Relationships>"#,
        PACKAGE_REL_NS
    )
}
