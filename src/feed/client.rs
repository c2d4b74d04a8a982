use crate::feed::session::FeedSession;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

/// Drive one push channel connection until it closes or fails.
///
/// Text frames are handed to the session one at a time, so the session is
/// the only writer to the live collection while this runs. The session ends
/// `Disconnected` on every exit path; no reconnect is attempted here.
pub async fn run_feed(session: &FeedSession, url: &str) {
    session.begin_connect();
    info!(url = %url, "Connecting to push channel");

    let (ws_stream, _) = match connect_async(url).await {
        Ok(connected) => connected,
        Err(e) => {
            session.on_error(&e.to_string());
            return;
        }
    };

    session.on_open();
    let (mut sink, mut stream) = ws_stream.split();

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let outcome = session.on_message(&text);
                debug!(outcome = ?outcome, "Push channel frame handled");
            }
            Ok(Message::Ping(data)) => {
                if let Err(e) = sink.send(Message::Pong(data)).await {
                    session.on_error(&e.to_string());
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                session.on_close();
                return;
            }
            Ok(_) => {
                // Binary and pong frames are not part of the protocol
            }
            Err(e) => {
                session.on_error(&e.to_string());
                return;
            }
        }
    }

    session.on_close();
}
