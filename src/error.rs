use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageToExcelError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("シートが見つかりません: {0}")]
    SheetNotFound(String),

    #[error("Excel読み込みエラー: {0}")]
    WorkbookRead(String),

    #[error("画像読み込みエラー: {0}")]
    ImageDecode(String),

    #[error("Excel書き込みエラー: {0}")]
    ExcelWrite(String),

    #[error("ワーカー起動エラー: {0}")]
    WorkerPool(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] image_to_excel_common::Error),
}

pub type Result<T> = std::result::Result<T, ImageToExcelError>;
