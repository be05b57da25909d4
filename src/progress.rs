//! 進捗集計モジュール
//!
//! 完了件数はオーケストレーターがタスク回収時にだけ数える（ワーカーは触らない）。
//! 通知先は `ProgressSink` で差し替える。処理中は最大99%、
//! 保存が成功した時点で100%を送る。

use crossbeam::channel::Sender;
use indicatif::ProgressBar;

/// 進捗の通知先
///
/// 呼び出し元のスレッドから呼ばれるとは限らない。
pub trait ProgressSink: Send + Sync {
    fn emit(&self, percent: u8);
}

/// 通知しない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _percent: u8) {}
}

/// クロージャによる通知
pub struct FnProgress<F>(pub F);

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(u8) + Send + Sync,
{
    fn emit(&self, percent: u8) {
        (self.0)(percent)
    }
}

/// チャネル経由の通知
///
/// 途中経過は受信側が詰まっていれば捨てる。完了（100%）だけは空きを待って必ず届ける。
impl ProgressSink for Sender<u8> {
    fn emit(&self, percent: u8) {
        if percent >= 100 {
            // 受信側が既に閉じていれば届け先はない
            let _ = self.send(percent);
        } else {
            let _ = self.try_send(percent);
        }
    }
}

impl ProgressSink for ProgressBar {
    fn emit(&self, percent: u8) {
        self.set_position(percent as u64);
    }
}

/// 進捗率の計算と単調増加の保証
pub struct ProgressAggregator<'a> {
    sink: &'a dyn ProgressSink,
    last: Option<u8>,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, last: None }
    }

    /// 完了件数を報告（0〜99%）
    pub fn report(&mut self, completed: usize, total: usize) {
        let percent = if total == 0 {
            0
        } else {
            (completed.min(total) * 99 / total) as u8
        };
        self.emit(percent);
    }

    /// 保存成功後に100%を送る
    pub fn finish(&mut self) {
        self.emit(100);
    }

    /// 最後に送った値
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    fn emit(&mut self, percent: u8) {
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.sink.emit(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_is_monotonic_and_capped() {
        let values = Mutex::new(Vec::new());
        let sink = FnProgress(|p: u8| values.lock().unwrap().push(p));
        let mut aggregator = ProgressAggregator::new(&sink);

        aggregator.report(0, 4);
        aggregator.report(2, 4);
        aggregator.report(1, 4);
        aggregator.report(4, 4);
        aggregator.report(4, 4);

        assert_eq!(*values.lock().unwrap(), vec![0, 49, 99]);
        assert_eq!(aggregator.last(), Some(99));

        aggregator.finish();
        assert_eq!(values.lock().unwrap().last(), Some(&100));
    }

    #[test]
    fn test_report_without_tasks() {
        let values = Mutex::new(Vec::new());
        let sink = FnProgress(|p: u8| values.lock().unwrap().push(p));
        let mut aggregator = ProgressAggregator::new(&sink);

        aggregator.report(0, 0);
        aggregator.finish();
        assert_eq!(*values.lock().unwrap(), vec![0, 100]);
    }

    #[test]
    fn test_channel_sink_drops_intermediate_values() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let mut aggregator = ProgressAggregator::new(&tx);

        aggregator.report(1, 3);
        aggregator.report(2, 3);

        // 容量1なので最初の値だけ残る
        assert_eq!(rx.try_recv().unwrap(), 33);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_always_delivers_completion() {
        let (tx, rx) = crossbeam::channel::bounded(4);

        let received = std::thread::scope(|s| {
            let consumer = s.spawn(|| {
                let mut received = Vec::new();
                while let Ok(p) = rx.recv() {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    received.push(p);
                }
                received
            });

            let mut aggregator = ProgressAggregator::new(&tx);
            for done in 0..=10 {
                aggregator.report(done, 10);
            }
            aggregator.finish();
            drop(aggregator);
            drop(tx);

            consumer.join().unwrap()
        });

        assert_eq!(received.last(), Some(&100));
        assert!(received.windows(2).all(|w| w[0] < w[1]), "単調増加でない: {:?}", received);
    }
}
