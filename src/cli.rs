use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "image-to-excel")]
#[command(about = "品番に対応する画像をExcelへ一括埋め込みするツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像を埋め込んだExcelを生成
    Run {
        /// 入力Excelファイル (.xlsx)
        #[arg(required = true)]
        excel: PathBuf,

        /// 画像フォルダ（直下のみ検索）
        #[arg(required = true)]
        images: PathBuf,

        /// 対象シート名（省略時は先頭シート）
        #[arg(short, long, default_value = "")]
        sheet: String,

        /// 品番列（例: A）
        #[arg(long)]
        code_col: Option<String>,

        /// 画像を配置する列（例: F）
        #[arg(long)]
        image_col: Option<String>,

        /// 行高さ (pt)
        #[arg(long)]
        row_height: Option<f64>,

        /// 列幅 (文字数)
        #[arg(long)]
        col_width: Option<f64>,

        /// ワーカー数（0以下は1）
        #[arg(short, long, allow_negative_numbers = true)]
        workers: Option<i64>,

        /// 出力ファイル（省略時は <入力名>_output_<日時>.xlsx）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },

    /// シート名の一覧を表示
    Sheets {
        /// 入力Excelファイル
        #[arg(required = true)]
        excel: PathBuf,
    },

    /// 既定値を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// 品番列の既定値
        #[arg(long)]
        set_code_col: Option<String>,

        /// 画像列の既定値
        #[arg(long)]
        set_image_col: Option<String>,

        /// 行高さの既定値 (pt)
        #[arg(long)]
        set_row_height: Option<f64>,

        /// 列幅の既定値 (文字数)
        #[arg(long)]
        set_col_width: Option<f64>,

        /// ワーカー数の既定値
        #[arg(long)]
        set_workers: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "image-to-excel", "run", "items.xlsx", "photos", "--sheet", "Sheet1", "--workers", "0", "--json",
        ]);
        match cli.command {
            Commands::Run { excel, sheet, workers, json, code_col, .. } => {
                assert_eq!(excel, PathBuf::from("items.xlsx"));
                assert_eq!(sheet, "Sheet1");
                assert_eq!(workers, Some(0));
                assert!(json);
                assert!(code_col.is_none());
            }
            _ => panic!("runとして解析されていない"),
        }
    }

    #[test]
    fn test_parse_run_negative_workers() {
        let cli = Cli::parse_from(["image-to-excel", "run", "a.xlsx", "img", "-w", "-2"]);
        match cli.command {
            Commands::Run { workers, sheet, .. } => {
                assert_eq!(workers, Some(-2));
                assert!(sheet.is_empty());
            }
            _ => panic!("runとして解析されていない"),
        }
    }
}
