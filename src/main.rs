use anyhow::Context;
use clap::Parser;
use image_to_excel::cli::{Cli, Commands};
use image_to_excel::config::AppConfig;
use image_to_excel::{available_workers, document, process};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "image_to_excel=debug" } else { "image_to_excel=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        bar.set_style(style);
    }
    bar
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut app_config = AppConfig::load().context("設定ファイルを読み込めません")?;

    match cli.command {
        Commands::Run {
            excel,
            images,
            sheet,
            code_col,
            image_col,
            row_height,
            col_width,
            workers,
            output,
            json,
        } => {
            let mut config = app_config.job(&excel, &images, &sheet);
            if let Some(col) = code_col {
                config.code_col = col;
            }
            if let Some(col) = image_col {
                config.image_col = col;
            }
            if let Some(height) = row_height {
                config.row_height = height;
            }
            if let Some(width) = col_width {
                config.col_width = width;
            }
            if let Some(count) = workers {
                config.worker_count = count;
            }
            config.output_path = output.map(|p| p.display().to_string());

            let bar = if json { ProgressBar::hidden() } else { progress_bar() };
            let result = process(config, &bar);
            bar.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.message);
                if !result.output_path.is_empty() {
                    println!("✔ 出力: {}", result.output_path);
                }
                if !result.missing_codes.is_empty() {
                    println!("画像が見つからない品番 ({}件):", result.missing_codes.len());
                    for code in &result.missing_codes {
                        println!("  - {}", code);
                    }
                }
            }

            if !result.success {
                std::process::exit(1);
            }
        }

        Commands::Sheets { excel } => {
            let names = document::sheet_names(&excel)
                .with_context(|| format!("シート一覧を取得できません: {}", excel.display()))?;
            for name in names {
                println!("{}", name);
            }
        }

        Commands::Config {
            show,
            set_code_col,
            set_image_col,
            set_row_height,
            set_col_width,
            set_workers,
        } => {
            let mut changed = false;
            if let Some(col) = set_code_col {
                app_config.set_code_col(col)?;
                changed = true;
            }
            if let Some(col) = set_image_col {
                app_config.set_image_col(col)?;
                changed = true;
            }
            if let Some(height) = set_row_height {
                app_config.row_height = height;
                changed = true;
            }
            if let Some(width) = set_col_width {
                app_config.col_width = width;
                changed = true;
            }
            if let Some(count) = set_workers {
                app_config.worker_count = count;
                changed = true;
            }

            if changed {
                app_config.save().context("設定ファイルを保存できません")?;
                println!("✔ 設定を保存しました");
            }

            if show || !changed {
                println!("設定:");
                println!("  品番列: {}", app_config.code_col);
                println!("  画像列: {}", app_config.image_col);
                println!("  行高さ: {}pt", app_config.row_height);
                println!("  列幅: {}", app_config.col_width);
                println!("  ワーカー数: {} (推奨: {})", app_config.worker_count, available_workers());
            }
        }
    }

    Ok(())
}
