use courier_core::{ExchangeId, HttpMethod, Request, TransportEvent};
use courier_logging::net_trace;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{compose_url, EngineConfig};

/// Receives the events of running exchanges.
pub trait EventSink: Send + Sync {
    fn emit(&self, exchange: ExchangeId, event: TransportEvent);
}

/// Forwards transport events into the runner's channel.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<(ExchangeId, TransportEvent)>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<(ExchangeId, TransportEvent)>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, exchange: ExchangeId, event: TransportEvent) {
        let _ = self.tx.send((exchange, event));
    }
}

/// Why an exchange ended without a complete reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("cancelled")]
    Cancelled,
}

/// Performs one HTTP exchange.
///
/// Implementations report `Status` once headers arrive, then `Data` per body
/// chunk, and always end with exactly one `Finished`, also when `cancel`
/// fires.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        exchange: ExchangeId,
        request: Request,
        sink: &dyn EventSink,
        cancel: CancellationToken,
    );
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    api_base: String,
    api_version: u32,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, TransportFailure> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.reply_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| TransportFailure::Request(err.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_version: config.api_version,
        })
    }

    async fn run(
        &self,
        exchange: ExchangeId,
        request: Request,
        sink: &dyn EventSink,
    ) -> Result<(), TransportFailure> {
        let url = compose_url(&self.api_base, self.api_version, &request)
            .map_err(|err| TransportFailure::InvalidUrl(err.to_string()))?;
        net_trace!("exchange {exchange}: {} {url}", request.method);

        let builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        let builder = match request.body {
            Some(body) => builder
                .header(CONTENT_TYPE, body.content_type)
                .body(body.bytes),
            None => builder,
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        sink.emit(exchange, TransportEvent::Status(response.status().as_u16()));

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if !chunk.is_empty() {
                sink.emit(exchange, TransportEvent::Data(chunk.to_vec()));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn exchange(
        &self,
        exchange: ExchangeId,
        request: Request,
        sink: &dyn EventSink,
        cancel: CancellationToken,
    ) {
        let failure = tokio::select! {
            result = self.run(exchange, request, sink) => result.err(),
            _ = cancel.cancelled() => Some(TransportFailure::Cancelled),
        };
        sink.emit(
            exchange,
            TransportEvent::Finished {
                failure: failure.map(|failure| failure.to_string()),
            },
        );
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout(err.to_string());
    }
    if err.is_connect() {
        return TransportFailure::Connect(err.to_string());
    }
    TransportFailure::Request(err.to_string())
}
