//! Пул воркеров для периодического пинга целей
//!
//! # Features
//! - Фиксированное число воркеров поверх tokio
//! - Таймаут на каждый пинг, паника пингера не роняет воркер
//! - Ограниченная или неограниченная очередь задач
//! - Graceful shutdown: `stop` ждет все принятые задачи и закрывает выходной канал
//! - Метрики и мониторинг

pub mod errors;
pub mod model;
pub mod pool;
pub mod prober;
pub mod producer;

pub use errors::{PoolError, ProbeError};
pub use model::{Job, Outcome, PoolMetrics, Response};
pub use pool::{ClosedPolicy, Config, QueueCapacity, WorkerPool, WorkerPoolInner};
pub use prober::{HttpProber, Prober};
pub use producer::spawn_producer;
