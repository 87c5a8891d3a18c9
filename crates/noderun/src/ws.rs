//! WebSocket transport: one text message per frame.

use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitSink;
use futures::stream::SplitStream;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::Message;

use crate::transport;
use crate::transport::Transport;

/// Frames carried over an accepted WebSocket.
///
/// Sending and receiving lock separate halves, so a pending `recv` never
/// blocks a `send`.
pub struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(socket: WebSocketStream<S>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

fn map_ws_error(e: tungstenite::Error) -> transport::Error {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            transport::Error::ConnectionLost(e.to_string())
        }
        tungstenite::Error::Protocol(p) => transport::Error::Protocol(p.to_string()),
        e => transport::Error::Io(e.to_string()),
    }
}

#[async_trait::async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let text = String::from_utf8(payload.to_vec())
            .map_err(|e| transport::Error::Protocol(format!("frame is not UTF-8: {}", e)))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(map_ws_error)
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.into_bytes())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Some(bytes)),
                // Control frames are answered by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(None),
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }
}
