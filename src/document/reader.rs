//! 入力Excelの読み込み（calamine）

use super::{CellValue, SheetModel};
use crate::error::{ImageToExcelError, Result};
use crate::task::{CellRef, Row};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// 読み込み結果
#[derive(Debug, Clone)]
pub struct InputWorkbook {
    /// 処理対象シートのセル値（空指定時は先頭シート）
    pub sheet: SheetModel,
    /// 品番が空でない行（行順）
    pub rows: Vec<Row>,
}

impl InputWorkbook {
    pub fn sheet_name(&self) -> &str {
        &self.sheet.name
    }
}

fn open(path: &Path) -> Result<Xlsx<BufReader<File>>> {
    if !path.is_file() {
        return Err(ImageToExcelError::FileNotFound(path.display().to_string()));
    }
    open_workbook(path)
        .map_err(|e| ImageToExcelError::WorkbookRead(format!("{}: {}", path.display(), e)))
}

/// シート名一覧
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// 対象シートを読み込み、品番行を抽出する
///
/// 他のシートは読まない（出力時に元のパッケージからそのまま引き継ぐ）。
pub fn read_workbook(
    path: &Path,
    sheet_name: &str,
    code_col: u16,
    image_col: u16,
) -> Result<InputWorkbook> {
    let mut workbook = open(path)?;
    let names = workbook.sheet_names().to_vec();

    let target = if sheet_name.is_empty() {
        names
            .first()
            .cloned()
            .ok_or_else(|| ImageToExcelError::SheetNotFound("(シートがありません)".into()))?
    } else if names.iter().any(|n| n == sheet_name) {
        sheet_name.to_string()
    } else {
        return Err(ImageToExcelError::SheetNotFound(sheet_name.to_string()));
    };

    let range = workbook
        .worksheet_range(&target)
        .map_err(|e| ImageToExcelError::WorkbookRead(format!("{}: {}", target, e)))?;
    let sheet = sheet_from_range(&target, &range);
    let rows = extract_rows(&sheet, code_col, image_col);

    debug!(sheet = %target, rows = rows.len(), "品番行を抽出");

    Ok(InputWorkbook { sheet, rows })
}

fn sheet_from_range(name: &str, range: &Range<Data>) -> SheetModel {
    let mut sheet = SheetModel::new(name.to_string());
    let Some((start_row, start_col)) = range.start() else {
        return sheet;
    };

    for (row, col, data) in range.used_cells() {
        if let Some(value) = cell_value(data) {
            let cell = CellRef::new(start_row + row as u32, (start_col as usize + col) as u16);
            sheet.cells.insert(cell, value);
        }
    }
    sheet
}

fn cell_value(data: &Data) -> Option<CellValue> {
    let value = match data {
        Data::Empty => return None,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    };
    Some(value)
}

/// 品番列の値が空でない行を行順に取り出す
pub fn extract_rows(sheet: &SheetModel, code_col: u16, image_col: u16) -> Vec<Row> {
    sheet
        .cells
        .iter()
        .filter(|(cell, _)| cell.col == code_col)
        .filter_map(|(cell, value)| {
            let code = value.code_text();
            let code = code.trim();
            if code.is_empty() {
                None
            } else {
                Some(Row::new(cell.row + 1, code, image_col))
            }
        })
        .collect()
}
