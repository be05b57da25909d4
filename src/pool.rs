//! ワーカープール
//!
//! 固定数のワーカーが共有キュー（投入順FIFO）からタスクを取り出して処理する。
//! 完了したタスクは呼び出し元スレッドで1件ずつ回収される。
//! 個々のタスクの失敗はタスク自身の状態で表し、プール全体のエラーにはしない。

use crate::error::{ImageToExcelError, Result};
use crossbeam::channel;
use tracing::debug;

pub struct WorkerPool {
    worker_count: usize,
}

impl WorkerPool {
    /// ワーカー数0は1に補正
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// 全タスクを処理して完了順に返す
    ///
    /// `on_retire(task, completed, total)` は完了タスクを回収するたびに
    /// 呼び出し元スレッドで呼ばれる。全ワーカーの終了を待ってから戻る。
    pub fn run<T, F, R>(&self, tasks: Vec<T>, handler: F, mut on_retire: R) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(T) -> T + Sync,
        R: FnMut(&T, usize, usize),
    {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.worker_count.min(total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("row-worker-{}", i))
            .build()
            .map_err(|e| ImageToExcelError::WorkerPool(e.to_string()))?;

        let (task_tx, task_rx) = channel::unbounded();
        for task in tasks {
            task_tx
                .send(task)
                .map_err(|_| ImageToExcelError::WorkerPool("タスクキューが閉じています".into()))?;
        }
        drop(task_tx);

        debug!(workers, total, "ワーカー起動");

        let (done_tx, done_rx) = channel::unbounded();
        let handler = &handler;
        let mut completed = Vec::with_capacity(total);

        pool.in_place_scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move |_| {
                    for task in task_rx.iter() {
                        if done_tx.send(handler(task)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            // 全ワーカーの送信側が閉じるまで回収
            for task in done_rx.iter() {
                on_retire(&task, completed.len() + 1, total);
                completed.push(task);
            }
        });

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_workers_coerced_to_one() {
        assert_eq!(WorkerPool::new(0).worker_count(), 1);
    }

    #[test]
    fn test_run_empty() {
        let done = WorkerPool::new(4).run(Vec::<u32>::new(), |t| t, |_, _, _| {}).unwrap();
        assert!(done.is_empty());
    }

    #[test]
    fn test_all_tasks_drained_once() {
        let calls = AtomicUsize::new(0);
        let tasks: Vec<u32> = (0..100).collect();

        let done = WorkerPool::new(8)
            .run(
                tasks,
                |t| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    t * 2
                },
                |_, _, _| {},
            )
            .unwrap();

        assert_eq!(done.len(), 100);
        assert_eq!(calls.load(Ordering::SeqCst), 100);
        let unique: HashSet<u32> = done.into_iter().collect();
        assert_eq!(unique, (0..100).map(|t| t * 2).collect());
    }

    #[test]
    fn test_single_worker_preserves_submission_order() {
        let tasks: Vec<u32> = (0..20).collect();
        let done = WorkerPool::new(1).run(tasks, |t| t, |_, _, _| {}).unwrap();
        assert_eq!(done, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_retire_counts_are_sequential() {
        let seen = Mutex::new(Vec::new());
        WorkerPool::new(3)
            .run((0..10).collect::<Vec<u32>>(), |t| t, |_, completed, total| {
                seen.lock().unwrap().push((completed, total));
            })
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, (1..=10).map(|c| (c, 10)).collect::<Vec<_>>());
    }

    #[test]
    fn test_runs_concurrently_up_to_worker_count() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        WorkerPool::new(4)
            .run(
                (0..16).collect::<Vec<u32>>(),
                |t| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    t
                },
                |_, _, _| {},
            )
            .unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 2, "並列実行されていない: {}", peak);
        assert!(peak <= 4, "ワーカー数を超えて実行された: {}", peak);
    }
}
