//! 行タスクの型定義
//!
//! 1行 = 1タスク。タスクを処理中のワーカーだけが状態を更新し、
//! 終端状態はオーケストレーターが集計する。

use image_to_excel_common::column_name;
use std::fmt;
use std::path::PathBuf;

/// セル位置（行・列とも0始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.col), self.row + 1)
    }
}

/// 入力シートの1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 行番号（1始まり）
    pub number: u32,
    /// 品番（前後の空白は除去済み）
    pub code: String,
    /// 画像を配置するセル
    pub target: CellRef,
}

impl Row {
    pub fn new(number: u32, code: impl Into<String>, image_col: u16) -> Self {
        Self {
            number,
            code: code.into(),
            target: CellRef::new(number.saturating_sub(1), image_col),
        }
    }
}

/// タスクの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Pending,
    /// 画像ファイルが見つかった
    Resolved,
    /// 画像ファイルなし（想定内、失敗扱いしない）
    MissingImage,
    /// 画像が壊れている・未対応形式
    DecodeFailed(String),
    /// 配置済み
    Placed,
    /// ドキュメントへの書き込みに失敗
    WriteFailed(String),
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskOutcome::MissingImage
                | TaskOutcome::DecodeFailed(_)
                | TaskOutcome::Placed
                | TaskOutcome::WriteFailed(_)
        )
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, TaskOutcome::DecodeFailed(_) | TaskOutcome::WriteFailed(_))
    }
}

/// 行タスク
#[derive(Debug, Clone)]
pub struct RowTask {
    /// 投入順（行順）の連番
    pub seq: usize,
    pub row: Row,
    pub image_path: Option<PathBuf>,
    pub outcome: TaskOutcome,
}

impl RowTask {
    pub fn new(seq: usize, row: Row) -> Self {
        Self {
            seq,
            row,
            image_path: None,
            outcome: TaskOutcome::Pending,
        }
    }

    pub fn code(&self) -> &str {
        &self.row.code
    }
}

/// 終端状態の件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub placed: usize,
    pub missing: usize,
    pub decode_failed: usize,
    pub write_failed: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Placed => self.placed += 1,
            TaskOutcome::MissingImage => self.missing += 1,
            TaskOutcome::DecodeFailed(_) => self.decode_failed += 1,
            TaskOutcome::WriteFailed(_) => self.write_failed += 1,
            TaskOutcome::Pending | TaskOutcome::Resolved => {}
        }
    }

    pub fn total(&self) -> usize {
        self.placed + self.missing + self.decode_failed + self.write_failed
    }

    pub fn failures(&self) -> usize {
        self.decode_failed + self.write_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ref_display() {
        assert_eq!(CellRef::new(0, 0).to_string(), "A1");
        assert_eq!(CellRef::new(2, 5).to_string(), "F3");
        assert_eq!(CellRef::new(9, 27).to_string(), "AB10");
    }

    #[test]
    fn test_row_target_cell() {
        let row = Row::new(3, "A3", 5);
        assert_eq!(row.target, CellRef::new(2, 5));
        assert_eq!(row.target.to_string(), "F3");
    }

    #[test]
    fn test_outcome_terminal() {
        assert!(!TaskOutcome::Pending.is_terminal());
        assert!(!TaskOutcome::Resolved.is_terminal());
        assert!(TaskOutcome::MissingImage.is_terminal());
        assert!(TaskOutcome::Placed.is_terminal());
        assert!(TaskOutcome::DecodeFailed("x".into()).is_fault());
        assert!(!TaskOutcome::MissingImage.is_fault());
    }

    #[test]
    fn test_tally() {
        let mut tally = OutcomeTally::default();
        for outcome in [
            TaskOutcome::Placed,
            TaskOutcome::Placed,
            TaskOutcome::MissingImage,
            TaskOutcome::WriteFailed("lock".into()),
        ] {
            tally.record(&outcome);
        }
        assert_eq!(tally.total(), 4);
        assert_eq!(tally.failures(), 1);
        assert_eq!(tally.placed, 2);
    }
}
