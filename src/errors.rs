use std::time::Duration;
use thiserror::Error;


/// Ошибки жизненного цикла пула
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Config(String),

    #[error("pool is closed")]
    Closed,

    #[error("pool is already started")]
    AlreadyStarted,

    #[error("pool is not started")]
    NotStarted,

    #[error("no tokio runtime to spawn workers on")]
    NoRuntime,
}


/// Ошибка одного пинга. Никогда не роняет воркер, уходит в `Outcome`
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProbeError {
    #[error("{0}")]
    Transport(String),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("prober panicked: {0}")]
    Panicked(String),
}

impl ProbeError {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }
}
