use super::{
    errors::{PoolError, ProbeError},
    model::{
        Job,
        Outcome,
        PoolMetrics,
        Response,
    },
    prober::Prober,
};
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
};
use crossbeam::deque::{Injector, Steal};
use futures::FutureExt;
use tokio::{
    sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// Емкость очереди задач
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    /// `submit` никогда не ждет
    Unbounded,
    /// `submit` ждет, пока в очереди больше `n` задач
    Bounded(usize),
}

/// Что делать с `submit` после `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedPolicy {
    /// Молча выбросить задачу, вернуть `Ok(())`
    Discard,
    /// Вернуть `PoolError::Closed`
    Reject,
}


/// Конфигурация пула
#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub timeout: Duration,
    pub capacity: QueueCapacity,
    pub closed_policy: ClosedPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 3,
            timeout: Duration::from_secs(2),
            capacity: QueueCapacity::Unbounded,
            closed_policy: ClosedPolicy::Discard,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus,
            capacity: QueueCapacity::Bounded(num_cpus * 10),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            workers: num_cpus::get() * 2,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::Config("worker count must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(PoolError::Config("probe timeout must be positive".into()));
        }
        if self.capacity == QueueCapacity::Bounded(0) {
            return Err(PoolError::Config("bounded queue capacity must be positive".into()));
        }
        Ok(())
    }
}


/// Задача в очереди. Permit держит место в ограниченной очереди до выдачи воркеру
struct Queued {
    job: Job,
    _permit: Option<OwnedSemaphorePermit>,
}

pub type WorkerPool = Arc<WorkerPoolInner>;

#[inline(always)]
fn unlikely(b: bool) -> bool {
    #[cold]
    fn cold() {}
    if !b { cold() }
    b
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


/// Пул воркеров с фиксированным числом задач-пингеров
///
/// Жизненный цикл: `new` -> `start` -> `submit`* -> `stop`. `stop` терминальный.
pub struct WorkerPoolInner {
    prober: Arc<dyn Prober>,
    inject: Injector<Queued>,
    global_notify: Notify,
    cancellation_token: CancellationToken,
    in_flight: AtomicUsize,
    all_jobs_completed: Notify,
    semaphore: Option<Arc<Semaphore>>,
    output: Mutex<Option<mpsc::Sender<Outcome>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
    queued: AtomicUsize,
    busy_workers: AtomicUsize,
    submitted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    discarded: AtomicUsize,
    config: Config,
}

impl WorkerPoolInner {
    pub fn new(
        workers: usize,
        timeout: Duration,
        prober: impl Prober,
        output: mpsc::Sender<Outcome>,
    ) -> Result<WorkerPool, PoolError> {
        let config = Config {
            workers,
            timeout,
            ..Default::default()
        };
        Self::with_config(config, prober, output)
    }

    pub fn with_config(
        config: Config,
        prober: impl Prober,
        output: mpsc::Sender<Outcome>,
    ) -> Result<WorkerPool, PoolError> {
        config.validate()?;

        let semaphore = match config.capacity {
            QueueCapacity::Unbounded => None,
            QueueCapacity::Bounded(n) => Some(Arc::new(Semaphore::new(n))),
        };

        Ok(Arc::new(WorkerPoolInner {
            prober: Arc::new(prober),
            inject: Injector::new(),
            global_notify: Notify::new(),
            cancellation_token: CancellationToken::new(),
            in_flight: AtomicUsize::new(0),
            all_jobs_completed: Notify::new(),
            semaphore,
            output: Mutex::new(Some(output)),
            workers: Mutex::new(Vec::with_capacity(config.workers)),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            busy_workers: AtomicUsize::new(0),
            submitted: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            config,
        }))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Запускает `config.workers` воркеров. Нужен tokio runtime
    pub fn start(self: &Arc<Self>) -> Result<(), PoolError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PoolError::NoRuntime)?;

        // Держим лок всё время запуска, чтобы stop увидел все handles
        let mut workers = lock(&self.workers);

        if self.is_stopped() {
            return Err(PoolError::Closed);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(PoolError::AlreadyStarted);
        }
        let output = lock(&self.output).take().ok_or(PoolError::Closed)?;

        for id in 0..self.config.workers {
            let pool = self.clone();
            let output = output.clone();
            workers.push(runtime.spawn(async move {
                pool.worker_loop(id, output).await;
            }));
        }

        info!(workers = self.config.workers, timeout = ?self.config.timeout, "pool started");
        Ok(())
    }

    /// Ставит задачу в очередь.
    ///
    /// `in_flight` увеличивается до того, как задача станет видна воркерам,
    /// поэтому `stop` не может увидеть ноль, пока задача в пути.
    pub async fn submit(&self, job: Job) -> Result<(), PoolError> {
        if self.is_stopped() {
            return self.refuse(job);
        }
        if !self.started.load(Ordering::Acquire) {
            return Err(PoolError::NotStarted);
        }

        let admission = Admission::new(self);
        if self.is_stopped() {
            drop(admission);
            return self.refuse(job);
        }

        let permit = match &self.semaphore {
            Some(s) => match s.clone().acquire_owned().await {
                Ok(p) => Some(p),
                Err(_) => {
                    drop(admission);
                    return self.refuse(job);
                }
            },
            None => None,
        };

        // Пока ждали место в очереди, пул мог начать остановку
        if permit.is_some() && self.is_stopped() {
            drop(permit);
            drop(admission);
            return self.refuse(job);
        }

        admission.accept();
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.queued.fetch_add(1, Ordering::Relaxed);
        debug!(target_url = %job.target, "job submitted");
        self.inject.push(Queued { job, _permit: permit });
        self.global_notify.notify_one();
        Ok(())
    }

    fn refuse(&self, job: Job) -> Result<(), PoolError> {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        match self.config.closed_policy {
            ClosedPolicy::Discard => {
                debug!(target_url = %job.target, "pool stopped, job discarded");
                Ok(())
            }
            ClosedPolicy::Reject => Err(PoolError::Closed),
        }
    }

    /// Останавливает пул: новые задачи не принимаются, ждем все принятые,
    /// отпускаем воркеров и закрываем выходной канал. Повторный вызов сразу возвращается
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("pool already stopped");
            return;
        }
        info!(in_flight = self.in_flight.load(Ordering::SeqCst), "stopping pool");

        self.wait_idle().await;
        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut *lock(&self.workers));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task failed");
            }
        }

        // Воркеры уже вышли и дропнули свои клоны, это последний
        drop(lock(&self.output).take());
        info!("all workers stopped");
    }

    /// Ждет, пока `in_flight` не станет нулем
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.all_jobs_completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    #[inline]
    fn complete_one(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if unlikely(prev == 1) {
            self.all_jobs_completed.notify_waiters();
        }
    }

    fn next_job(&self) -> Option<Queued> {
        loop {
            match self.inject.steal() {
                Steal::Success(q) => {
                    self.queued.fetch_sub(1, Ordering::Relaxed);
                    return Some(q);
                }
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    async fn worker_loop(&self, id: usize, output: mpsc::Sender<Outcome>) {
        debug!(worker = id, "worker started");

        loop {
            if let Some(Queued { job, _permit }) = self.next_job() {
                drop(_permit);
                self.process(id, job, &output).await;
                continue;
            }

            let notified = self.global_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.inject.is_empty() {
                continue;
            }

            tokio::select! {
                _ = notified => {}
                _ = self.cancellation_token.cancelled() => {
                    if self.inject.is_empty() {
                        break;
                    }
                }
            }
        }

        info!(worker = id, "worker finished processing");
    }

    async fn process(&self, worker: usize, job: Job, output: &mpsc::Sender<Outcome>) {
        self.busy_workers.fetch_add(1, Ordering::Relaxed);

        let timeout = self.config.timeout;
        let started = Instant::now();
        let probe = AssertUnwindSafe(async {
            self.prober.probe(&job.target, timeout).await
        })
        .catch_unwind();

        let result = match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(Ok(status))) => Ok(Response {
                status,
                latency: started.elapsed(),
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(panic)) => {
                let msg = panic_message(panic.as_ref());
                warn!(worker, target_url = %job.target, panic = %msg, "prober panicked");
                Err(ProbeError::Panicked(msg))
            }
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        if result.is_ok() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        debug!(worker, target_url = %job.target, ok = result.is_ok(), "probe finished");

        let outcome = Outcome {
            target: job.target,
            result,
        };
        if let Err(mpsc::error::SendError(outcome)) = output.send(outcome).await {
            warn!(worker, target_url = %outcome.target, "outcome receiver dropped, outcome lost");
        }

        self.busy_workers.fetch_sub(1, Ordering::Relaxed);
        self.complete_one();
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            in_flight: self.in_flight.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            busy_workers: self.busy_workers.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    /// Мониторинг метрик с callback
    /// ВАЖНО: вызовите token.cancel() для остановки мониторинга
    pub fn start_monitoring<F>(self: &Arc<Self>, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => {
                        drop(pool);
                        break;
                    }
                }
            }
        });

        token
    }
}


/// Учет одной задачи в `in_flight`. Если `submit` отменили до постановки
/// в очередь, счетчик вернется при дропе
struct Admission<'a> {
    pool: &'a WorkerPoolInner,
    armed: bool,
}

impl<'a> Admission<'a> {
    fn new(pool: &'a WorkerPoolInner) -> Self {
        pool.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { pool, armed: true }
    }

    fn accept(mut self) {
        self.armed = false;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.complete_one();
        }
    }
}
