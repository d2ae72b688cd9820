use crate::channel::{ChannelEvent, InboundStream, MessageChannel};
use crate::error::ChannelError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parley_core::Message;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// [`MessageChannel`] over a WebSocket connection to the signaling server.
pub struct WsChannel {
    tx: mpsc::UnboundedSender<WsMessage>,
    open: Arc<AtomicBool>,
}

impl WsChannel {
    pub async fn connect(url: &str) -> Result<(Arc<Self>, InboundStream), ChannelError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        info!("Connected to signaling server at {}", url);

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if sender.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        let mut recv_task = tokio::spawn(async move {
            while let Some(frame) = receiver.next().await {
                let event = match frame {
                    Ok(WsMessage::Text(text)) => ChannelEvent::Text(text.to_string()),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    break;
                }
            }
        });

        let open_flag = open.clone();
        let url = url.to_owned();
        tokio::spawn(async move {
            tokio::select! {
                _ = (&mut send_task) => recv_task.abort(),
                _ = (&mut recv_task) => send_task.abort(),
            };
            open_flag.store(false, Ordering::SeqCst);
            info!("WebSocket to {} closed", url);
        });

        Ok((Arc::new(Self { tx, open }), inbound_rx))
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let json = message.to_json();
        debug!("-> {}", json);
        self.tx
            .send(WsMessage::Text(json.into()))
            .map_err(|_| ChannelError::Closed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if self.tx.send(WsMessage::Close(None)).is_err() {
                warn!("WebSocket writer already gone");
            }
        }
    }
}
