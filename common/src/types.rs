//! 処理設定と処理結果の型定義
//!
//! CLIとUI層で共有される型:
//! - Config: 1回の埋め込み処理の設定（処理開始後は不変）
//! - ProcessResult: 処理結果のサマリ

use crate::layout::{column_index, DEFAULT_COL_WIDTH, DEFAULT_ROW_HEIGHT_PT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// 品番列の既定値
pub const DEFAULT_CODE_COL: &str = "A";
/// 画像列の既定値
pub const DEFAULT_IMAGE_COL: &str = "F";
/// ワーカー数の既定値
pub const DEFAULT_WORKER_COUNT: i64 = 10;

/// 埋め込み処理の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// 入力Excelファイル
    pub excel_path: String,
    /// 画像フォルダ（直下のみ検索）
    pub image_dir: String,
    /// 品番列
    pub code_col: String,
    /// 画像を配置する列
    pub image_col: String,
    /// 対象シート名（空なら先頭シート）
    pub sheet_name: String,
    /// 行高さ（pt）
    pub row_height: f64,
    /// 列幅（文字数）
    pub col_width: f64,
    /// ワーカー数（0以下は1に補正）
    pub worker_count: i64,
    /// 出力先（省略時は入力ファイルの隣に生成）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            excel_path: String::new(),
            image_dir: String::new(),
            code_col: DEFAULT_CODE_COL.into(),
            image_col: DEFAULT_IMAGE_COL.into(),
            sheet_name: String::new(),
            row_height: DEFAULT_ROW_HEIGHT_PT,
            col_width: DEFAULT_COL_WIDTH,
            worker_count: DEFAULT_WORKER_COUNT,
            output_path: None,
        }
    }
}

impl Config {
    pub fn new(excel_path: impl Into<String>, image_dir: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            excel_path: excel_path.into(),
            image_dir: image_dir.into(),
            sheet_name: sheet_name.into(),
            ..Default::default()
        }
    }

    /// 未指定・不正値を既定値に補正した設定を返す
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        config.excel_path = config.excel_path.trim().to_string();
        config.image_dir = config.image_dir.trim().to_string();
        config.sheet_name = config.sheet_name.trim().to_string();

        if config.code_col.trim().is_empty() {
            config.code_col = DEFAULT_CODE_COL.into();
        }
        if config.image_col.trim().is_empty() {
            config.image_col = DEFAULT_IMAGE_COL.into();
        }
        if !(config.row_height > 0.0) {
            config.row_height = DEFAULT_ROW_HEIGHT_PT;
        }
        if !(config.col_width > 0.0) {
            config.col_width = DEFAULT_COL_WIDTH;
        }
        if config.worker_count < 1 {
            config.worker_count = 1;
        }
        config
    }

    /// 必須項目と列名を検証
    pub fn validate(&self) -> Result<()> {
        if self.excel_path.trim().is_empty() {
            return Err(Error::Config("Excelファイルが指定されていません".into()));
        }
        if self.image_dir.trim().is_empty() {
            return Err(Error::Config("画像フォルダが指定されていません".into()));
        }
        self.code_column()?;
        self.image_column()?;
        Ok(())
    }

    /// 品番列（0始まり）
    pub fn code_column(&self) -> Result<u16> {
        column_index(&self.code_col)
    }

    /// 画像列（0始まり）
    pub fn image_column(&self) -> Result<u16> {
        column_index(&self.image_col)
    }

    /// 実際に起動するワーカー数
    pub fn workers(&self) -> usize {
        usize::try_from(self.worker_count.max(1)).unwrap_or(1)
    }
}

/// 処理結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub success: bool,
    /// 結果サマリまたはエラー内容
    pub message: String,
    /// 画像が見つからなかった品番（行順）
    pub missing_codes: Vec<String>,
    /// 出力ファイルの絶対パス（失敗時は空）
    pub output_path: String,
}

impl ProcessResult {
    /// 失敗結果
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let config: Config = serde_json::from_str(
            r#"{"excelPath": "items.xlsx", "imageDir": "photos", "sheetName": "Sheet1"}"#,
        )
        .unwrap();

        assert_eq!(config.code_col, "A");
        assert_eq!(config.image_col, "F");
        assert_eq!(config.row_height, 105.0);
        assert_eq!(config.col_width, 20.0);
        assert_eq!(config.worker_count, 10);
        assert!(config.output_path.is_none());
    }

    #[test]
    fn test_normalized_coerces_invalid_values() {
        let config = Config {
            code_col: " ".into(),
            image_col: String::new(),
            row_height: 0.0,
            col_width: -3.0,
            worker_count: 0,
            ..Config::new("a.xlsx", "img", "")
        }
        .normalized();

        assert_eq!(config.code_col, "A");
        assert_eq!(config.image_col, "F");
        assert_eq!(config.row_height, 105.0);
        assert_eq!(config.col_width, 20.0);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.workers(), 1);
    }

    #[test]
    fn test_workers_negative_is_one() {
        let config = Config { worker_count: -5, ..Default::default() };
        assert_eq!(config.workers(), 1);
    }

    #[test]
    fn test_validate_requires_paths() {
        assert!(Config::new("", "img", "").validate().is_err());
        assert!(Config::new("a.xlsx", "", "").validate().is_err());
        assert!(Config::new("a.xlsx", "img", "").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_column() {
        let config = Config { image_col: "F1".into(), ..Config::new("a.xlsx", "img", "") };
        assert!(matches!(config.validate(), Err(Error::InvalidColumn(_))));
    }

    #[test]
    fn test_process_result_json_shape() {
        let result = ProcessResult {
            success: true,
            message: "ok".into(),
            missing_codes: vec!["A2".into()],
            output_path: "/tmp/out.xlsx".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["missingCodes"][0], "A2");
        assert_eq!(json["outputPath"], "/tmp/out.xlsx");
    }
}
