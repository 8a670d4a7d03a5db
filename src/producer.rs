//! Периодический генератор задач

use super::{
    errors::PoolError,
    model::Job,
    pool::WorkerPool,
};
use tokio::{
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};


/// Каждые `interval` ставит в пул по задаче на каждую цель.
///
/// Первая партия уходит сразу. Останавливается по `token` или когда пул
/// перестает принимать задачи. Задача возвращает число принятых задач.
/// Нулевой `interval` это `PoolError::Config`.
pub fn spawn_producer(
    pool: WorkerPool,
    targets: Vec<String>,
    interval: Duration,
    token: CancellationToken,
) -> Result<JoinHandle<usize>, PoolError> {
    if interval.is_zero() {
        return Err(PoolError::Config("producer interval must be positive".into()));
    }

    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut accepted = 0usize;

        'outer: loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => break,
            }

            for target in &targets {
                // При ClosedPolicy::Discard submit после stop молча отдает Ok
                if pool.is_stopped() {
                    break 'outer;
                }

                let submit = pool.submit(Job::new(target.as_str()));
                let result: Result<(), PoolError> = tokio::select! {
                    res = submit => res,
                    _ = token.cancelled() => break 'outer,
                };

                match result {
                    Ok(()) => accepted += 1,
                    Err(e) => {
                        debug!(error = %e, "pool refused job");
                        break 'outer;
                    }
                }
            }
            debug!(accepted, "producer round done");
        }

        info!(accepted, "producer stopped");
        accepted
    }))
}
