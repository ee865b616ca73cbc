#[cfg(test)]
mod tests {
    use rmcs_core::RmcsError;
    use rmcs_runtime::WorkerLoop;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    // ── Lifecycle ──────────────────────────────────────────────

    #[test]
    fn test_submit_before_start_fails() {
        let worker = WorkerLoop::new("idle");
        let err = worker.submit(async { Ok(1) }).err().unwrap();
        assert!(matches!(err, RmcsError::WorkerNotRunning(name) if name == "idle"));
    }

    #[test]
    fn test_submit_after_stop_fails() {
        let worker = WorkerLoop::new("stopped");
        worker.start().unwrap();
        worker.stop(WAIT).unwrap();
        assert!(!worker.is_running());
        let result = worker.submit(async { Ok(()) });
        assert!(matches!(result, Err(RmcsError::WorkerNotRunning(_))));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let worker = WorkerLoop::new("twice");
        worker.stop(WAIT).unwrap();
        worker.start().unwrap();
        worker.stop(WAIT).unwrap();
        worker.stop(WAIT).unwrap();
    }

    #[test]
    fn test_start_is_idempotent_and_restartable() {
        let worker = WorkerLoop::new("again");
        worker.start().unwrap();
        worker.start().unwrap();
        worker.stop(WAIT).unwrap();
        worker.start().unwrap();
        let value = worker.submit(async { Ok("back") }).unwrap().result(WAIT).unwrap();
        assert_eq!(value, "back");
        worker.stop(WAIT).unwrap();
    }

    // ── Results ────────────────────────────────────────────────

    #[test]
    fn test_submit_returns_value() {
        let worker = WorkerLoop::new("value");
        worker.start().unwrap();
        let handle = worker
            .submit(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(6 * 7)
            })
            .unwrap();
        assert_eq!(handle.result(WAIT).unwrap(), 42);
        worker.stop(WAIT).unwrap();
    }

    #[test]
    fn test_error_is_captured_in_handle() {
        let worker = WorkerLoop::new("errors");
        worker.start().unwrap();
        let handle = worker
            .submit(async { Err::<(), _>(RmcsError::Storage("disk full".into())) })
            .unwrap();
        let err = handle.result(WAIT).unwrap_err();
        assert!(matches!(err, RmcsError::Storage(msg) if msg == "disk full"));
        worker.stop(WAIT).unwrap();
    }

    #[test]
    fn test_panic_is_captured_in_handle() {
        let worker = WorkerLoop::new("panics");
        worker.start().unwrap();
        let handle = worker
            .submit(async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .unwrap();
        let err = handle.result(WAIT).unwrap_err();
        assert!(matches!(err, RmcsError::WorkFailed(msg) if msg.contains("boom")));

        // The loop survives the panic.
        let ok = worker.submit(async { Ok(1) }).unwrap().result(WAIT).unwrap();
        assert_eq!(ok, 1);
        worker.stop(WAIT).unwrap();
    }

    #[test]
    fn test_result_times_out() {
        let worker = WorkerLoop::new("slow");
        worker.start().unwrap();
        let handle = worker
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .unwrap();
        let err = handle.result(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, RmcsError::WorkTimeout(_)));
        worker.stop(WAIT).unwrap();
    }

    #[test]
    fn test_stop_cancels_outstanding_work() {
        let worker = WorkerLoop::new("cancel");
        worker.start().unwrap();
        let handle = worker
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .unwrap();
        worker.stop(WAIT).unwrap();
        let err = handle.result(WAIT).unwrap_err();
        assert!(matches!(err, RmcsError::WorkCancelled));
    }

    #[test]
    fn test_stop_gives_up_on_a_blocked_thread() {
        let worker = WorkerLoop::new("stuck");
        worker.start().unwrap();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let _handle = worker
            .submit(async move {
                let _ = started_tx.send(());
                // Holds the loop's only thread; the stop command cannot run.
                std::thread::sleep(Duration::from_secs(3));
                Ok(())
            })
            .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        let limit = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = worker.stop(limit).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, RmcsError::WorkTimeout(d) if d == limit));
        assert!(elapsed >= limit, "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "blocked past timeout: {elapsed:?}");
        assert!(!worker.is_running());
        assert!(matches!(
            worker.submit(async { Ok(()) }),
            Err(RmcsError::WorkerNotRunning(_))
        ));
    }

    // ── Concurrency ────────────────────────────────────────────

    #[test]
    fn test_submit_from_many_threads() {
        let worker = Arc::new(WorkerLoop::new("shared"));
        worker.start().unwrap();

        let threads: Vec<_> = (0..8u64)
            .map(|i| {
                let worker = worker.clone();
                std::thread::spawn(move || {
                    worker
                        .submit(async move { Ok(i * 2) })
                        .unwrap()
                        .result(WAIT)
                        .unwrap()
                })
            })
            .collect();

        let mut results: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        worker.stop(WAIT).unwrap();
    }

    #[test]
    fn test_loops_are_independent() {
        let a = WorkerLoop::new("a");
        let b = WorkerLoop::new("b");
        a.start().unwrap();
        b.start().unwrap();
        a.stop(WAIT).unwrap();
        let value = b.submit(async { Ok("still up") }).unwrap().result(WAIT).unwrap();
        assert_eq!(value, "still up");
        b.stop(WAIT).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_join_from_async_code() {
        let worker = WorkerLoop::new("async-join");
        worker.start().unwrap();
        let handle = worker.submit(async { Ok(String::from("done")) }).unwrap();
        assert_eq!(handle.join(WAIT).await.unwrap(), "done");
        tokio::task::spawn_blocking(move || worker.stop(WAIT))
            .await
            .unwrap()
            .unwrap();
    }
}
