use super::errors::ProbeError;
use std::{
    fmt,
    time::Duration,
};


/// Задача для пула: одна цель для пинга
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub target: String,
}

impl Job {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }
}


/// Успешный ответ цели
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub latency: Duration,
}


/// Результат обработки одной задачи
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub target: String,
    pub result: Result<Response, ProbeError>,
}

impl Outcome {
    pub fn success(target: impl Into<String>, status: u16, latency: Duration) -> Self {
        Self {
            target: target.into(),
            result: Ok(Response { status, latency }),
        }
    }

    pub fn failure(target: impl Into<String>, error: ProbeError) -> Self {
        Self {
            target: target.into(),
            result: Err(error),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.result.as_ref().ok().map(|r| r.status)
    }

    #[inline]
    pub fn latency(&self) -> Option<Duration> {
        self.result.as_ref().ok().map(|r| r.latency)
    }

    #[inline]
    pub fn error(&self) -> Option<&ProbeError> {
        self.result.as_ref().err()
    }

    /// Человекочитаемая строка, формат потребляется внешними скриптами
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(r) => write!(
                f,
                "[SUCCESS] - [{}] - Status: {}, Response Time: {:?}",
                self.target, r.status, r.latency
            ),
            Err(e) => write!(f, "[ERROR] - [{}] - {}", self.target, e),
        }
    }
}


#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub in_flight: usize,
    pub queued: usize,
    pub busy_workers: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub discarded: usize,
}

impl PoolMetrics {
    pub fn utilization(&self, workers: usize) -> f64 {
        if workers == 0 {
            return 0.0;
        }
        self.busy_workers as f64 / workers as f64
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed();
        if total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / total as f64
    }
}
