//! 描画パート（xl/drawings/drawingN.xml）の生成

use super::xml::{xml_error, REL_NS};
use crate::error::Result;
use crate::task::CellRef;
use crate::transcoder::Placement;
use image_to_excel_common::layout::px_to_emu;
use quick_xml::events::Event;
use quick_xml::Reader;

pub(crate) const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
pub(crate) const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

/// 画像1枚分のアンカー
///
/// セル左上からのオフセットとpx寸法をそのままEMUで書く。画像ファイルのDPIには依存しない。
pub(crate) fn anchor_xml(cell: CellRef, placement: &Placement, rel_id: &str, shape_id: u32, descr: &str) -> String {
    let fit = &placement.fit;
    let cx = px_to_emu(fit.width_px);
    let cy = px_to_emu(fit.height_px);

    format!(
        concat!(
            r#"<xdr:oneCellAnchor xmlns:xdr="{xdr}" xmlns:a="{a}" xmlns:r="{r}">"#,
            "<xdr:from><xdr:col>{col}</xdr:col><xdr:colOff>{col_off}</xdr:colOff>",
            "<xdr:row>{row}</xdr:row><xdr:rowOff>{row_off}</xdr:rowOff></xdr:from>",
            r#"<xdr:ext cx="{cx}" cy="{cy}"/>"#,
            "<xdr:pic><xdr:nvPicPr>",
            r#"<xdr:cNvPr id="{id}" name="Picture {id}" descr="{descr}"/>"#,
            r#"<xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#,
            r#"<xdr:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
            r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr></xdr:pic>"#,
            "<xdr:clientData/></xdr:oneCellAnchor>"
        ),
        xdr = XDR_NS,
        a = A_NS,
        r = REL_NS,
        col = cell.col,
        col_off = px_to_emu(fit.offset_x),
        row = cell.row,
        row_off = px_to_emu(fit.offset_y),
        cx = cx,
        cy = cy,
        id = shape_id,
        descr = quick_xml::escape::escape(descr),
        rel = rel_id,
    )
}

/// アンカーを並べた新しい描画パート
pub(crate) fn new_drawing_xml(anchors: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="{}" xmlns:a="{}">{}</xdr:wsDr>"#,
        XDR_NS, A_NS, anchors
    )
}

/// 既存の描画パートで使われている図形IDの最大値
pub(crate) fn max_shape_id(xml: &[u8], part: &str) -> Result<u32> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut max = 0;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"cNvPr" => {
                let id = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"id")
                    .and_then(|a| String::from_utf8_lossy(&a.value).parse::<u32>().ok());
                max = max.max(id.unwrap_or(0));
            }
            _ => {}
        }
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_to_excel_common::Fit;

    fn placement() -> Placement {
        Placement {
            data: Vec::new(),
            extension: "png",
            fit: Fit { scale: 0.135, width_px: 135, height_px: 68, offset_x: 5, offset_y: 36 },
        }
    }

    #[test]
    fn test_anchor_uses_pixel_size() {
        let xml = anchor_xml(CellRef::new(2, 5), &placement(), "rId1", 3, "A&B.png");

        assert!(xml.contains("<xdr:col>5</xdr:col><xdr:colOff>47625</xdr:colOff>"));
        assert!(xml.contains("<xdr:row>2</xdr:row><xdr:rowOff>342900</xdr:rowOff>"));
        assert!(xml.contains(r#"<xdr:ext cx="1285875" cy="647700"/>"#));
        assert!(xml.contains(r#"descr="A&amp;B.png""#));
        assert!(xml.contains(r#"r:embed="rId1""#));
    }

    #[test]
    fn test_max_shape_id() {
        let anchors = format!(
            "{}{}",
            anchor_xml(CellRef::new(0, 0), &placement(), "rId1", 2, "a"),
            anchor_xml(CellRef::new(1, 0), &placement(), "rId2", 9, "b")
        );
        let xml = new_drawing_xml(&anchors);
        assert_eq!(max_shape_id(xml.as_bytes(), "d").unwrap(), 9);
        assert_eq!(max_shape_id(new_drawing_xml("").as_bytes(), "d").unwrap(), 0);
    }
}
