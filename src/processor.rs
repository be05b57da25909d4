//! 一括埋め込み処理
//!
//! ## 処理フロー
//! 1. Reading: 入力Excelと画像フォルダを読み込む（失敗は即中断、何も書き込まない）
//! 2. Dispatching: 品番のある行ごとに RowTask を作る
//! 3. Draining: ワーカープールで 解決 → 読み込み → 配置 を並行実行
//! 4. Finalizing: 出力Excelを1度だけ保存
//!
//! 画像なしの行は失敗扱いしない。デコード失敗・書き込み失敗が1件でもあれば
//! 保存は行ったうえで全体を失敗として報告する。

use crate::document::{self, DocumentWriter};
use crate::error::Result;
use crate::pool::WorkerPool;
use crate::progress::{ProgressAggregator, ProgressSink};
use crate::resolver::ImageIndex;
use crate::task::{OutcomeTally, RowTask, TaskOutcome};
use crate::transcoder;
use image_to_excel_common::layout::CELL_MARGIN_PX;
use image_to_excel_common::{CellBox, Config, ProcessResult};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 処理の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Reading,
    Dispatching,
    Draining,
    Finalizing,
    Succeeded,
    Failed,
}

/// 失敗した行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// 行番号（1始まり）
    pub row: u32,
    pub code: String,
    pub reason: String,
}

/// 処理の詳細結果
#[derive(Debug, Clone)]
pub struct ProcessReport {
    /// 保存したファイル（絶対パス）
    pub output_path: PathBuf,
    pub tally: OutcomeTally,
    /// 画像なしの品番（行順）
    pub missing_codes: Vec<String>,
    /// デコード失敗・書き込み失敗の行（行順）
    pub failures: Vec<RowFailure>,
    /// 画像なし品番のログ（書き込めた場合のみ）
    pub missing_log: Option<PathBuf>,
}

impl ProcessReport {
    pub fn is_clean(&self) -> bool {
        self.tally.failures() == 0
    }

    pub fn message(&self) -> String {
        if self.is_clean() {
            return format!(
                "処理完了: {}件の画像を埋め込みました（画像なし {}件）",
                self.tally.placed, self.tally.missing
            );
        }

        let mut message = format!(
            "完了（{}件の行で失敗）: デコード失敗 {}件, 書き込み失敗 {}件。部分的な結果を保存しました: {}",
            self.tally.failures(),
            self.tally.decode_failed,
            self.tally.write_failed,
            self.output_path.display()
        );
        if let Some(first) = self.failures.first() {
            message.push_str(&format!(" / 行{} ({}): {}", first.row, first.code, first.reason));
        }
        message
    }

    /// 呼び出し元に返す結果に変換（行の失敗があれば outputPath は空）
    pub fn into_result(self) -> ProcessResult {
        let success = self.is_clean();
        ProcessResult {
            success,
            message: self.message(),
            output_path: if success {
                self.output_path.display().to_string()
            } else {
                String::new()
            },
            missing_codes: self.missing_codes,
        }
    }
}

pub struct Processor {
    config: Config,
    state: ProcessState,
}

impl Processor {
    pub fn new(config: Config) -> Self {
        Self {
            config: config.normalized(),
            state: ProcessState::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    fn transition(&mut self, next: ProcessState) {
        debug!(from = ?self.state, to = ?next, "状態遷移");
        self.state = next;
    }

    /// 処理を実行する
    ///
    /// 入力エラー・保存エラーは `Err`。行単位の失敗は `ProcessReport` に含まれる。
    pub fn run(&mut self, progress: &dyn ProgressSink) -> Result<ProcessReport> {
        let result = self.execute(progress);
        let terminal = match &result {
            Ok(report) if report.is_clean() => ProcessState::Succeeded,
            _ => ProcessState::Failed,
        };
        self.transition(terminal);
        result
    }

    fn execute(&mut self, progress: &dyn ProgressSink) -> Result<ProcessReport> {
        let config = self.config.clone();

        // 1. Reading
        self.transition(ProcessState::Reading);
        config.validate()?;
        let code_col = config.code_column()?;
        let image_col = config.image_column()?;
        let excel_path = PathBuf::from(&config.excel_path);

        let input = document::read_workbook(&excel_path, &config.sheet_name, code_col, image_col)?;
        let index = ImageIndex::scan(Path::new(&config.image_dir))?;
        let writer = DocumentWriter::new(&excel_path, input.sheet_name(), config.row_height, config.col_width);

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let output_path = output_path_for(&excel_path, config.output_path.as_deref(), &stamp);

        // 2. Dispatching
        self.transition(ProcessState::Dispatching);
        let tasks: Vec<RowTask> = input
            .rows
            .into_iter()
            .enumerate()
            .map(|(seq, row)| RowTask::new(seq, row))
            .collect();
        let total = tasks.len();
        info!(
            sheet = %writer.sheet_name(),
            rows = total,
            images = index.len(),
            workers = config.workers(),
            "埋め込み開始"
        );

        // 3. Draining
        self.transition(ProcessState::Draining);
        let mut aggregator = ProgressAggregator::new(progress);
        aggregator.report(0, total);

        let cell = CellBox::from_document_units(config.row_height, config.col_width);
        let pool = WorkerPool::new(config.workers());
        let mut completed = pool.run(
            tasks,
            |task| handle_task(task, &index, &writer, cell),
            |task, done, total| {
                debug!(row = task.row.number, code = %task.code(), outcome = ?task.outcome, "タスク完了");
                aggregator.report(done, total);
            },
        )?;
        completed.sort_by_key(|task| task.seq);

        // 4. Finalizing
        self.transition(ProcessState::Finalizing);
        let saved = writer.finalize(&output_path)?;
        aggregator.finish();

        let mut report = summarize(saved, &completed);
        debug_assert_eq!(report.tally.total(), total);

        if !report.missing_codes.is_empty() {
            let log_path = missing_log_path_for(&excel_path, &stamp);
            report.missing_log = write_missing_log(&log_path, &report.missing_codes);
        }

        info!(
            placed = report.tally.placed,
            missing = report.tally.missing,
            failed = report.tally.failures(),
            "埋め込み完了"
        );
        Ok(report)
    }
}

/// 1行分の処理: 解決 → 読み込み → 配置
fn handle_task(mut task: RowTask, index: &ImageIndex, writer: &DocumentWriter, cell: CellBox) -> RowTask {
    let Some(path) = index.resolve(task.code()) else {
        task.outcome = TaskOutcome::MissingImage;
        return task;
    };
    task.image_path = Some(path.to_path_buf());
    task.outcome = TaskOutcome::Resolved;

    let raw = match transcoder::load(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(row = task.row.number, code = %task.code(), error = %e, "画像を読み込めません");
            task.outcome = TaskOutcome::DecodeFailed(e.to_string());
            return task;
        }
    };

    let placement = transcoder::fit(raw, cell, CELL_MARGIN_PX);
    task.outcome = match writer.place(placement, task.row.target) {
        Ok(()) => TaskOutcome::Placed,
        Err(e) => {
            warn!(row = task.row.number, code = %task.code(), error = %e, "画像を配置できません");
            TaskOutcome::WriteFailed(e.to_string())
        }
    };
    task
}

fn summarize(output_path: PathBuf, tasks: &[RowTask]) -> ProcessReport {
    let mut tally = OutcomeTally::default();
    let mut missing_codes = Vec::new();
    let mut failures = Vec::new();

    for task in tasks {
        tally.record(&task.outcome);
        match &task.outcome {
            TaskOutcome::MissingImage => missing_codes.push(task.code().to_string()),
            TaskOutcome::DecodeFailed(reason) | TaskOutcome::WriteFailed(reason) => {
                failures.push(RowFailure {
                    row: task.row.number,
                    code: task.code().to_string(),
                    reason: reason.clone(),
                });
            }
            _ => {}
        }
    }

    ProcessReport {
        output_path,
        tally,
        missing_codes,
        failures,
        missing_log: None,
    }
}

fn input_stem(excel_path: &Path) -> String {
    excel_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".into())
}

/// 出力先: 指定があればそのまま、なければ `<入力名>_output_<日時>.xlsx`
pub fn output_path_for(excel_path: &Path, configured: Option<&str>, stamp: &str) -> PathBuf {
    match configured.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => excel_path.with_file_name(format!("{}_output_{}.xlsx", input_stem(excel_path), stamp)),
    }
}

/// 画像なし品番のログ: `<入力名>_missing_<日時>.log`
pub fn missing_log_path_for(excel_path: &Path, stamp: &str) -> PathBuf {
    excel_path.with_file_name(format!("{}_missing_{}.log", input_stem(excel_path), stamp))
}

fn write_missing_log(path: &Path, codes: &[String]) -> Option<PathBuf> {
    match std::fs::write(path, codes.join("\n")) {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "画像なしログを書き込めません");
            None
        }
    }
}

/// 設定を受け取って処理し、結果を返す
///
/// エラーやワーカーのpanicも含め、すべて `ProcessResult` で返す。
pub fn process(config: Config, progress: &dyn ProgressSink) -> ProcessResult {
    let mut processor = Processor::new(config);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.run(progress)));

    match outcome {
        Ok(Ok(report)) => report.into_result(),
        Ok(Err(e)) => {
            warn!(error = %e, "処理に失敗");
            ProcessResult::failure(format!("処理に失敗しました: {}", e))
        }
        Err(_) => ProcessResult::failure("処理中に内部エラーが発生しました"),
    }
}
