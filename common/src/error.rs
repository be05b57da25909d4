//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid column: {0}")]
    InvalidColumn(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let error = Error::Config("Excelファイルが指定されていません".to_string());
        let display = format!("{}", error);
        assert_eq!(display, "Config error: Excelファイルが指定されていません");
    }

    #[test]
    fn test_error_display_invalid_column() {
        let error = Error::InvalidColumn("A1".to_string());
        assert_eq!(format!("{}", error), "Invalid column: A1");
    }
}
