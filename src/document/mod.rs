//! 出力ドキュメント
//!
//! 画像の配置は `DocumentWriter` 経由で1件ずつ `SheetLayer` に積み、
//! 保存時に入力のxlsxパッケージへまとめて反映する。入力のセル・数式・
//! 書式・結合セル・他シートは書き換えない。

mod drawing;
mod package;
pub mod reader;
mod sheet_xml;
mod xml;

pub use reader::{read_workbook, sheet_names, InputWorkbook};

use crate::error::{ImageToExcelError, Result};
use crate::task::CellRef;
use crate::transcoder::{self, Placement};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// セル値
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Number(f64),
    Bool(bool),
    /// Excelシリアル値
    DateTime(f64),
    /// "#DIV/0!" 等のエラー値
    Error(String),
}

impl CellValue {
    /// 品番として使う文字列表現（整数値は小数点なし）
    pub fn code_text(&self) -> String {
        match self {
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(n) => n.to_string(),
            CellValue::Error(_) => String::new(),
        }
    }
}

/// 読み込んだシートのセル値
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetModel {
    pub name: String,
    pub cells: BTreeMap<CellRef, CellValue>,
}

impl SheetModel {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// 対象シートに加える変更（画像と行高さ・列幅）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetLayer {
    /// 行（0始まり） → 高さ(pt)
    pub row_heights: BTreeMap<u32, f64>,
    /// 列（0始まり） → 幅(文字数)
    pub col_widths: BTreeMap<u16, f64>,
    pub images: BTreeMap<CellRef, Placement>,
}

fn write_error(context: impl std::fmt::Display, e: impl std::fmt::Display) -> ImageToExcelError {
    ImageToExcelError::ExcelWrite(format!("{}: {}", context, e))
}

/// 出力ドキュメントの唯一の所有者
///
/// ワーカーから並行に呼ばれるが、変更は Mutex で1件ずつ行う。
pub struct DocumentWriter {
    source: PathBuf,
    sheet_name: String,
    row_height: f64,
    col_width: f64,
    layer: Mutex<SheetLayer>,
}

impl DocumentWriter {
    /// `source` は入力のxlsx。保存時に読み直してパッケージを組み立てる
    pub fn new(source: &Path, sheet_name: &str, row_height: f64, col_width: f64) -> Self {
        Self {
            source: source.to_path_buf(),
            sheet_name: sheet_name.to_string(),
            row_height,
            col_width,
            layer: Mutex::new(SheetLayer::default()),
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// 画像をセルに配置し、行高さ・列幅を設定する
    pub fn place(&self, placement: Placement, cell: CellRef) -> Result<()> {
        // 埋め込めない画像はロックを取る前に弾く
        let format = image::guess_format(&placement.data).map_err(|e| write_error(cell, e))?;
        if transcoder::extension_for(format) != placement.extension {
            return Err(write_error(
                cell,
                format!("画像形式 {:?} と拡張子 {} が一致しません", format, placement.extension),
            ));
        }

        let mut layer = self
            .layer
            .lock()
            .map_err(|_| write_error(cell, "ドキュメントのロックが破損しています"))?;

        if layer.images.contains_key(&cell) {
            return Err(write_error(cell, "既に画像が配置されています"));
        }

        layer.row_heights.insert(cell.row, self.row_height);
        layer.col_widths.insert(cell.col, self.col_width);
        layer.images.insert(cell, placement);
        Ok(())
    }

    /// 現在の変更内容の複製
    pub fn snapshot(&self) -> Result<SheetLayer> {
        self.layer
            .lock()
            .map(|layer| layer.clone())
            .map_err(|_| write_error(&self.sheet_name, "ドキュメントのロックが破損しています"))
    }

    /// 入力に変更を反映したxlsxを保存し、出力先の絶対パスを返す
    pub fn finalize(self, output_path: &Path) -> Result<PathBuf> {
        let layer = self
            .layer
            .into_inner()
            .map_err(|_| write_error(&self.sheet_name, "ドキュメントのロックが破損しています"))?;

        package::write_package(&self.source, output_path, &self.sheet_name, &layer)?;

        info!(path = %output_path.display(), images = layer.images.len(), "Excelを保存");
        Ok(std::fs::canonicalize(output_path).unwrap_or_else(|_| output_path.to_path_buf()))
    }
}
