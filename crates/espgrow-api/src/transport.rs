// Transport seam between the channel manager and the socket.
//
// The channel only ever sees a sink of outbound text frames and a stream
// of inbound text frames. `WebSocketConnector` is the production
// implementation; tests plug in scripted connectors.

use std::pin::Pin;

use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::error::Error;

/// Outbound half of an open transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of an open transport. Ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// A freshly opened transport.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens transports to a controller URL.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Transport, Error>>;
}

// ── WebSocket ────────────────────────────────────────────────────────

/// [`Connector`] over `tokio-tungstenite`. Text frames only.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Transport, Error>> {
        Box::pin(async move {
            tracing::info!(url = %url, "Connecting to WebSocket");

            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

            tracing::info!("WebSocket connected");

            let (write, read) = ws_stream.split();

            let sink = write
                .sink_map_err(|e| Error::WebSocket(e.to_string()))
                .with(|text: String| future::ready(Ok::<_, Error>(Message::text(text))));

            let stream = read.filter_map(|frame| future::ready(text_frame(frame)));

            Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

/// Keep text frames and errors; everything else is handled by tungstenite
/// or ignored.
fn text_frame(frame: Result<Message, tungstenite::Error>) -> Option<Result<String, Error>> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Close(frame)) => {
            if let Some(ref cf) = frame {
                tracing::info!(
                    code = %cf.code,
                    reason = %cf.reason,
                    "WebSocket close frame received"
                );
            } else {
                tracing::info!("WebSocket close frame received (no payload)");
            }
            None
        }
        Ok(Message::Ping(_)) => {
            // tungstenite handles pong replies automatically
            tracing::trace!("WebSocket ping");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(Error::WebSocket(e.to_string()))),
    }
}
