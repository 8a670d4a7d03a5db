#[cfg(test)]
mod tests {
    use pingpool::{
        errors::{PoolError, ProbeError},
        model::Outcome,
        pool::{ClosedPolicy, Config, WorkerPoolInner},
        producer::spawn_producer,
    };
    use std::time::Duration;
    use tokio::{
        sync::mpsc,
        task::JoinHandle,
    };
    use tokio_util::sync::CancellationToken;

    fn collect(mut rx: mpsc::Receiver<Outcome>) -> JoinHandle<Vec<Outcome>> {
        tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(outcome) = rx.recv().await {
                outcomes.push(outcome);
            }
            outcomes
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_producer_rounds_until_cancelled() {
        println!("\n=== TEST: Продюсер до отмены ===");
        let prober = |_target: String, _timeout: Duration| async move { Ok::<u16, ProbeError>(200) };
        let (tx, rx) = mpsc::channel(16);
        let pool = WorkerPoolInner::new(2, Duration::from_millis(100), prober, tx).unwrap();
        pool.start().unwrap();
        let collector = collect(rx);

        let token = CancellationToken::new();
        let targets = vec!["https://a".to_string(), "https://b".to_string()];
        let producer = spawn_producer(pool.clone(), targets, Duration::from_millis(20), token.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        token.cancel();
        let accepted = producer.await.unwrap();
        pool.stop().await;

        let outcomes = collector.await.unwrap();
        println!("  Принято задач: {}", accepted);
        assert!(accepted >= 2, "первая партия уходит сразу");
        assert_eq!(outcomes.len(), accepted);
        assert!(outcomes.iter().all(|o| o.target == "https://a" || o.target == "https://b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_producer_exits_when_pool_stops() {
        println!("\n=== TEST: Продюсер выходит после stop ===");
        let prober = |_target: String, _timeout: Duration| async move { Ok::<u16, ProbeError>(200) };
        let (tx, rx) = mpsc::channel(16);
        let config = Config {
            workers: 1,
            closed_policy: ClosedPolicy::Reject,
            ..Default::default()
        };
        let pool = WorkerPoolInner::with_config(config, prober, tx).unwrap();
        pool.start().unwrap();
        let collector = collect(rx);

        let token = CancellationToken::new();
        let producer = spawn_producer(pool.clone(), vec!["x".into()], Duration::from_millis(10), token).unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        pool.stop().await;

        let accepted = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("продюсер должен завершиться сам")
            .unwrap();
        assert_eq!(collector.await.unwrap().len(), accepted);
    }

    #[tokio::test]
    async fn test_producer_rejects_zero_interval() {
        println!("\n=== TEST: Нулевой интервал продюсера ===");
        let prober = |_target: String, _timeout: Duration| async move { Ok::<u16, ProbeError>(200) };
        let (tx, rx) = mpsc::channel(4);
        let pool = WorkerPoolInner::new(1, Duration::from_millis(100), prober, tx).unwrap();
        pool.start().unwrap();
        let collector = collect(rx);

        let res = spawn_producer(pool.clone(), vec!["x".into()], Duration::ZERO, CancellationToken::new());
        assert!(matches!(res, Err(PoolError::Config(_))), "нулевой интервал должен быть ошибкой");

        pool.stop().await;
        assert!(collector.await.unwrap().is_empty());
    }
}
