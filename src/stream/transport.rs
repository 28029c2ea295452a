// Live feed transport
//
// A transport opens one connection and pumps text frames into a channel.
// The channel closing signals the connection closed; dropping the receiver
// terminates the connection.

use super::types::{StreamError, StreamResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Path of the live feed endpoint relative to the websocket base
pub const FEED_PATH: &str = "/ws/stream";

const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Something that happened on an open connection
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// One UTF-8 text frame
    Frame(String),

    /// Transport-level failure; the connection is finished
    Error(String),
}

/// Opens live feed connections
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a connection to `url`
    async fn open(&self, url: &Url) -> StreamResult<mpsc::Receiver<FeedEvent>>;
}

/// Build `<ws-base>/ws/stream?token=<bearer>`
pub fn feed_url(ws_base: &str, token: Option<&str>) -> StreamResult<Url> {
    let mut url =
        Url::parse(ws_base).map_err(|e| StreamError::InvalidUrl(format!("{}: {}", ws_base, e)))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(StreamError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    }

    let path = format!("{}{}", url.path().trim_end_matches('/'), FEED_PATH);
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("token", token.unwrap_or(""));

    Ok(url)
}

/// tokio-tungstenite backed transport
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn open(&self, url: &Url) -> StreamResult<mpsc::Receiver<FeedEvent>> {
        info!("Connecting to live feed: {}{}", url.origin().ascii_serialization(), url.path());

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::WebSocket(format!("Connection failed: {}", e)))?;

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        tokio::spawn(pump_frames(ws_stream, tx));

        Ok(rx)
    }
}

/// Forward frames until the server closes or the receiver goes away
async fn pump_frames(mut ws: WsStream, tx: mpsc::Sender<FeedEvent>) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("Feed receiver dropped, closing websocket");
                if let Err(e) = ws.close(None).await {
                    debug!("Error while closing websocket: {}", e);
                }
                break;
            }

            message = ws.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(FeedEvent::Frame(text.as_str().to_owned())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Ignoring binary frame on live feed");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Live feed closed by server");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by tungstenite
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(FeedEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    debug!("Live feed pump ended");
}
