//! 品番コードに対応する画像をExcelの指定列へ一括で埋め込む
//!
//! 入力Excelの各行の品番から画像フォルダ内のファイルを探し、
//! セルに収まるよう縮小して配置した新しいExcelを出力する。

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod pool;
pub mod processor;
pub mod progress;
pub mod resolver;
pub mod task;
pub mod transcoder;

pub use image_to_excel_common::{Config, ProcessResult};
pub use processor::{process, ProcessReport, Processor};
pub use progress::{FnProgress, NoProgress, ProgressSink};

/// 推奨ワーカー数（論理CPU数）
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
