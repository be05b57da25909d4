//! ユーザー既定値（~/.config/image-to-excel/config.json）

use crate::error::{ImageToExcelError, Result};
use image_to_excel_common::layout::{DEFAULT_COL_WIDTH, DEFAULT_ROW_HEIGHT_PT};
use image_to_excel_common::types::{DEFAULT_CODE_COL, DEFAULT_IMAGE_COL, DEFAULT_WORKER_COUNT};
use image_to_excel_common::{column_index, Config};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub code_col: String,
    pub image_col: String,
    pub row_height: f64,
    pub col_width: f64,
    pub worker_count: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            code_col: DEFAULT_CODE_COL.into(),
            image_col: DEFAULT_IMAGE_COL.into(),
            row_height: DEFAULT_ROW_HEIGHT_PT,
            col_width: DEFAULT_COL_WIDTH,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ImageToExcelError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("image-to-excel").join("config.json"))
    }

    pub fn set_code_col(&mut self, col: String) -> Result<()> {
        column_index(&col)?;
        self.code_col = col.trim().to_uppercase();
        Ok(())
    }

    pub fn set_image_col(&mut self, col: String) -> Result<()> {
        column_index(&col)?;
        self.image_col = col.trim().to_uppercase();
        Ok(())
    }

    /// 既定値を埋めた処理設定を作る
    pub fn job(&self, excel_path: &Path, image_dir: &Path, sheet_name: &str) -> Config {
        Config {
            excel_path: excel_path.display().to_string(),
            image_dir: image_dir.display().to_string(),
            sheet_name: sheet_name.to_string(),
            code_col: self.code_col.clone(),
            image_col: self.image_col.clone(),
            row_height: self.row_height,
            col_width: self.col_width,
            worker_count: self.worker_count,
            output_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.worker_count, 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.set_image_col("g".into()).unwrap();
        config.worker_count = 4;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.image_col, "G");
        assert_eq!(loaded.worker_count, 4);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"code_col": "B"}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.code_col, "B");
        assert_eq!(config.image_col, "F");
    }

    #[test]
    fn test_set_invalid_column() {
        let mut config = AppConfig::default();
        assert!(config.set_code_col("1A".into()).is_err());
        assert_eq!(config.code_col, "A");
    }

    #[test]
    fn test_job_uses_defaults() {
        let config = AppConfig::default();
        let job = config.job(Path::new("items.xlsx"), Path::new("photos"), "Sheet1");
        assert_eq!(job.image_col, "F");
        assert_eq!(job.sheet_name, "Sheet1");
        assert_eq!(job.excel_path, "items.xlsx");
    }
}
