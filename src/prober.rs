//! Пингующая часть: трейт `Prober` и HTTP реализация на reqwest

use super::errors::ProbeError;
use futures::{
    future::BoxFuture,
    FutureExt,
};
use std::{
    future::Future,
    time::Duration,
};
use reqwest::Client;
use tracing::debug;


/// Внешняя операция пинга. Возвращает статус ответа цели.
///
/// Воркер сам замеряет latency и сам ограничивает вызов таймаутом,
/// `timeout` передается чтобы реализация могла выставить его у транспорта.
pub trait Prober: Send + Sync + 'static {
    fn probe<'a>(&'a self, target: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u16, ProbeError>>;
}

impl<F, Fut> Prober for F
where
    F: Fn(String, Duration) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u16, ProbeError>> + Send + 'static,
{
    #[inline]
    fn probe<'a>(&'a self, target: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u16, ProbeError>> {
        self(target.to_owned(), timeout).boxed()
    }
}


/// GET запрос на цель через общий `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    require_success: bool,
}

impl HttpProber {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            require_success: false,
        }
    }

    /// Клиент с настройками по умолчанию. Ошибка сборки клиента (например TLS
    /// бэкенд) отдается вызывающему, а не паникует как `Client::default()`
    pub fn try_default() -> Result<Self, reqwest::Error> {
        Ok(Self::new(Client::builder().build()?))
    }

    /// Статусы вне 2xx/3xx превращаются в `ProbeError::Status`
    pub fn require_success(mut self, require: bool) -> Self {
        self.require_success = require;
        self
    }
}

impl Prober for HttpProber {
    fn probe<'a>(&'a self, target: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u16, ProbeError>> {
        async move {
            let response = self.client
                .get(target)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ProbeError::Timeout(timeout)
                    } else {
                        ProbeError::Transport(e.to_string())
                    }
                })?;

            let status = response.status();
            debug!(url = target, status = status.as_u16(), "http probe finished");

            if self.require_success && !(status.is_success() || status.is_redirection()) {
                return Err(ProbeError::Status(status.as_u16()));
            }
            Ok(status.as_u16())
        }
        .boxed()
    }
}
