//! WebSocket connector using tokio-tungstenite.

use async_trait::async_trait;
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, Link, TransportError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        crate::log_info!("WebSocket connected to {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (inbound_tx, inbound_rx) = unbounded::<String>();
        let (outbound_tx, mut outbound_rx) = unbounded::<String>();

        // Read task
        let url_for_read = url.to_string();
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        crate::log_debug!("WebSocket received: {}", text.as_str());
                        if inbound_tx.unbounded_send(text.as_str().to_owned()).is_err() {
                            // Transport dropped its end
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        crate::log_info!("WebSocket to {} received close frame", url_for_read);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        // Pong is handled automatically by tungstenite
                        crate::log_debug!("Received ping: {:?}", data);
                    }
                    Ok(_) => {
                        // Ignore binary, pong, etc.
                    }
                    Err(e) => {
                        crate::log_error!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }
        });

        // Write task
        tokio::spawn(async move {
            while let Some(json) = outbound_rx.next().await {
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    crate::log_error!("Send failed: {}", e);
                    break;
                }
            }
            // Sender dropped: close our side so the read task ends too.
            let _ = write.close().await;
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
