use clap::Parser;
use pingpool::{
    spawn_producer,
    ClosedPolicy,
    Config,
    HttpProber,
    Outcome,
    PoolError,
    Prober,
    QueueCapacity,
    WorkerPool,
    WorkerPoolInner,
};
use std::process::ExitCode;
use thiserror::Error;
use tokio::{
    runtime::Builder,
    sync::mpsc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;


const DEFAULT_TARGETS: &[&str] = &[
    "https://workshop.zhashkevych.com/",
    "https://golang-ninja.com/",
    "https://zhashkevych.com/",
    "https://google.com/",
    "https://golang.org/",
    "https://github.com/vadimkiryanov/pingrobot",
];

/// Периодически пингует список URL через пул воркеров
#[derive(Parser, Debug)]
#[command(name = "pingpool", version)]
struct Args {
    /// URL для пинга
    targets: Vec<String>,

    #[arg(long, env = "PINGPOOL_WORKERS", default_value_t = 3)]
    workers: usize,

    #[arg(long, env = "PINGPOOL_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,

    #[arg(
        long,
        env = "PINGPOOL_INTERVAL_MS",
        default_value_t = 3000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_ms: u64,

    /// Емкость очереди, без флага очередь неограниченная
    #[arg(long, env = "PINGPOOL_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Возвращать ошибку на submit после остановки вместо молчаливого сброса
    #[arg(long)]
    reject_closed: bool,

    /// Считать ответы вне 2xx/3xx ошибкой
    #[arg(long)]
    require_success: bool,
}

impl Args {
    fn pool_config(&self) -> Config {
        Config {
            workers: self.workers,
            timeout: Duration::from_millis(self.timeout_ms),
            capacity: self.queue_capacity.map_or(QueueCapacity::Unbounded, QueueCapacity::Bounded),
            closed_policy: if self.reject_closed { ClosedPolicy::Reject } else { ClosedPolicy::Discard },
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn targets(&self) -> Vec<String> {
        if self.targets.is_empty() {
            DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect()
        } else {
            self.targets.clone()
        }
    }
}


#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}


/// Пул и приемник результатов. Конфиг проверяется до создания канала
fn build_pool(
    config: Config,
    prober: impl Prober,
) -> Result<(WorkerPool, mpsc::Receiver<Outcome>), PoolError> {
    config.validate()?;
    let (tx, rx) = mpsc::channel(config.workers);
    let pool = WorkerPoolInner::with_config(config, prober, tx)?;
    Ok((pool, rx))
}

/// Ждет SIGINT, а на unix еще и SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            error!(error = %e, "failed to listen for ctrl-c");
                        }
                    }
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => error!(error = %e, "failed to listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}


fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let rt = match Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pingpool failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let prober = HttpProber::try_default()?.require_success(args.require_success);
    let (pool, mut rx) = build_pool(args.pool_config(), prober)?;
    pool.start()?;

    let token = CancellationToken::new();
    let producer = spawn_producer(pool.clone(), args.targets(), args.interval(), token.clone())?;

    let printer = tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            println!("{}", outcome.describe());
        }
    });

    shutdown_signal().await;
    info!("shutdown requested");

    token.cancel();
    let accepted = match producer.await {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "producer task failed");
            0
        }
    };
    pool.stop().await;
    if let Err(e) = printer.await {
        error!(error = %e, "printer task failed");
    }

    let metrics = pool.metrics();
    info!(
        accepted,
        succeeded = metrics.succeeded,
        failed = metrics.failed,
        "all workers stopped"
    );
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use pingpool::ProbeError;

    fn instant_prober() -> impl Prober {
        |_target: String, _timeout: Duration| async move { Ok::<u16, ProbeError>(200) }
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let args = Args::try_parse_from(["pingpool", "--workers", "0", "http://127.0.0.1:9/"]).unwrap();
        match build_pool(args.pool_config(), instant_prober()) {
            Err(PoolError::Config(_)) => {}
            Err(e) => panic!("expected config error, got {:?}", e),
            Ok(_) => panic!("expected config error, got a pool"),
        }
    }

    #[test]
    fn zero_queue_capacity_is_a_config_error() {
        let args = Args::try_parse_from(["pingpool", "--queue-capacity", "0"]).unwrap();
        assert!(matches!(
            build_pool(args.pool_config(), instant_prober()),
            Err(PoolError::Config(_))
        ));
    }

    #[test]
    fn zero_interval_is_rejected_by_cli() {
        assert!(Args::try_parse_from(["pingpool", "--interval-ms", "0"]).is_err());
        let args = Args::try_parse_from(["pingpool", "--interval-ms", "1"]).unwrap();
        assert_eq!(args.interval(), Duration::from_millis(1));
    }

    #[test]
    fn defaults_follow_pool_config() {
        let args = Args::try_parse_from(["pingpool"]).unwrap();
        let config = args.pool_config();
        assert_eq!(config.workers, 3);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.capacity, QueueCapacity::Unbounded);
        assert_eq!(config.closed_policy, ClosedPolicy::Discard);
        assert_eq!(args.targets().len(), DEFAULT_TARGETS.len());
    }

    #[tokio::test]
    async fn valid_config_builds_pool() {
        let args = Args::try_parse_from(["pingpool", "--workers", "2", "--reject-closed"]).unwrap();
        let (pool, mut rx) = build_pool(args.pool_config(), instant_prober()).unwrap();
        pool.start().unwrap();
        pool.stop().await;
        assert!(rx.recv().await.is_none());
    }
}
