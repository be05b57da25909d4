//! レイアウト計算モジュール
//!
//! Excelの寸法単位（行高さ=pt、列幅=文字数）とピクセルの変換、
//! および画像をセル内に収める配置計算を行う。

// ============================================
// 既定値
// ============================================

/// 行高さの既定値（pt）
pub const DEFAULT_ROW_HEIGHT_PT: f64 = 105.0;

/// 列幅の既定値（文字数）
pub const DEFAULT_COL_WIDTH: f64 = 20.0;

/// セル内の余白（px、上下左右）
pub const CELL_MARGIN_PX: f64 = 5.0;

// ============================================
// 変換係数
// ============================================

/// pt → px変換 (96dpi基準)
pub const PT_TO_PX: f64 = 96.0 / 72.0;

/// 既定フォント(Calibri 11)の数字1文字幅（px）
pub const MAX_DIGIT_WIDTH_PX: f64 = 7.0;

/// 列幅に加算されるセル内パディング（px）
pub const COLUMN_PADDING_PX: f64 = 5.0;

/// Excelの最大列数 (XFD)
pub const MAX_COLUMNS: u32 = 16_384;

/// 行高さ(pt) → px
#[inline]
pub fn row_height_to_px(pt: f64) -> f64 {
    pt * PT_TO_PX
}

/// 列幅(文字数) → px
pub fn col_width_to_px(width: f64) -> f64 {
    if width < 1.0 {
        (width * (MAX_DIGIT_WIDTH_PX + COLUMN_PADDING_PX)).round()
    } else {
        (width * MAX_DIGIT_WIDTH_PX + COLUMN_PADDING_PX).round()
    }
}

/// 列幅(文字数) → シートXMLの `<col width>` に書く値
///
/// パディング込みの幅を1/256文字単位で切り捨てる（20 → 20.7109375）。
pub fn col_width_to_xml(width: f64) -> f64 {
    (col_width_to_px(width) / MAX_DIGIT_WIDTH_PX * 256.0).trunc() / 256.0
}

/// 1pxあたりのEMU (96dpi)
pub const EMU_PER_PX: u64 = 9_525;

/// px → EMU（描画XMLの座標単位）
#[inline]
pub fn px_to_emu(px: u32) -> u64 {
    px as u64 * EMU_PER_PX
}

// ============================================
// 列名
// ============================================

/// 列名（"A", "f", "AA"）を0始まりの列番号に変換
pub fn column_index(name: &str) -> crate::Result<u16> {
    let name = name.trim();
    let invalid = || crate::Error::InvalidColumn(name.to_string());

    if name.is_empty() || name.len() > 3 {
        return Err(invalid());
    }

    let mut index: u32 = 0;
    for c in name.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(invalid());
        }
        index = index * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }

    if index > MAX_COLUMNS {
        return Err(invalid());
    }
    Ok((index - 1) as u16)
}

/// 0始まりの列番号を列名に変換
pub fn column_name(index: u16) -> String {
    let mut n = index as u32 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

// ============================================
// セル内配置
// ============================================

/// セルのピクセル寸法
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBox {
    pub width_px: f64,
    pub height_px: f64,
}

impl CellBox {
    /// 行高さ(pt)と列幅(文字数)からセル寸法を求める
    pub fn from_document_units(row_height_pt: f64, col_width: f64) -> Self {
        Self {
            width_px: col_width_to_px(col_width),
            height_px: row_height_to_px(row_height_pt),
        }
    }
}

/// 画像の配置結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    /// 縦横共通の倍率（1.0以下）
    pub scale: f64,
    /// 縮小後の幅（px）
    pub width_px: u32,
    /// 縮小後の高さ（px）
    pub height_px: u32,
    /// セル左端からのオフセット（px）
    pub offset_x: u32,
    /// セル上端からのオフセット（px）
    pub offset_y: u32,
}

/// 縦横比を保ったまま画像をセル内に収め、中央に配置する
///
/// 余白を除いた領域に収まる最大の倍率を使う。拡大はしない（倍率の上限は1.0）。
pub fn fit_image(image_width: u32, image_height: u32, cell: CellBox, margin_px: f64) -> Fit {
    let avail_w = (cell.width_px - margin_px * 2.0).max(1.0);
    let avail_h = (cell.height_px - margin_px * 2.0).max(1.0);
    let w = image_width.max(1) as f64;
    let h = image_height.max(1) as f64;

    let scale = (avail_w / w).min(avail_h / h).min(1.0);
    let scaled_w = w * scale;
    let scaled_h = h * scale;

    Fit {
        scale,
        width_px: scaled_w.round() as u32,
        height_px: scaled_h.round() as u32,
        offset_x: ((cell.width_px - scaled_w) / 2.0).max(0.0).floor() as u32,
        offset_y: ((cell.height_px - scaled_h) / 2.0).max(0.0).floor() as u32,
    }
}
