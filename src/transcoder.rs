//! 画像読み込み・配置計算モジュール
//!
//! PNG/JPEG/GIF/BMPはそのままxlsxに埋め込み、それ以外（WebP等）は
//! PNGに変換する。どの形式も一度全体をデコードし、途中で切れたファイルは
//! 読み込み失敗とする。配置は `fit_image` でセル内に収めて中央寄せ。

use crate::error::{ImageToExcelError, Result};
use image::{ImageFormat, ImageReader};
use image_to_excel_common::{fit_image, CellBox, Fit};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// xlsxにそのまま埋め込める形式
const EMBEDDABLE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// 読み込み済み画像
#[derive(Debug, Clone)]
pub struct RawImage {
    pub path: PathBuf,
    /// 埋め込み用のバイト列（変換済み）
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// 1セル分の配置情報。ドキュメントに1度だけ渡される
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub data: Vec<u8>,
    /// 埋め込み時のファイル拡張子（xl/media/imageN.<extension>）
    pub extension: &'static str,
    pub fit: Fit,
}

fn decode_error(path: &Path, detail: impl std::fmt::Display) -> ImageToExcelError {
    ImageToExcelError::ImageDecode(format!("{}: {}", path.display(), detail))
}

/// 画像ファイルを読み込む
///
/// 壊れたファイル・未対応形式は `ImageDecode`（ファイルが無い場合とは区別する）。
pub fn load(path: &Path) -> Result<RawImage> {
    let data = std::fs::read(path).map_err(|e| decode_error(path, e))?;
    decode(path, data)
}

fn decode(path: &Path, data: Vec<u8>) -> Result<RawImage> {
    let format = image::guess_format(&data).map_err(|e| decode_error(path, e))?;

    let (data, format, width, height) = if EMBEDDABLE_FORMATS.contains(&format) {
        let img = ImageReader::with_format(Cursor::new(&data), format)
            .decode()
            .map_err(|e| decode_error(path, e))?;
        let (width, height) = (img.width(), img.height());
        (data, format, width, height)
    } else {
        let img = image::load_from_memory_with_format(&data, format)
            .map_err(|e| decode_error(path, e))?;
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| decode_error(path, format!("PNG変換失敗: {}", e)))?;
        (png, ImageFormat::Png, img.width(), img.height())
    };

    if width == 0 || height == 0 {
        return Err(decode_error(path, "画像サイズが0です"));
    }

    Ok(RawImage {
        path: path.to_path_buf(),
        data,
        format,
        width,
        height,
    })
}

pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        _ => "png",
    }
}

/// セル寸法に合わせた配置を計算
pub fn fit(raw: RawImage, cell: CellBox, margin_px: f64) -> Placement {
    let fit = fit_image(raw.width, raw.height, cell, margin_px);
    Placement {
        extension: extension_for(raw.format),
        data: raw.data,
        fit,
    }
}
