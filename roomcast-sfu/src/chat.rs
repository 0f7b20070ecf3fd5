//! Room chat hub
//!
//! One task per room owns the client map. Joining, leaving and broadcasting
//! are commands sent to that task, so the map has a single writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

enum Command {
    Register { id: u64, tx: mpsc::Sender<String> },
    Unregister { id: u64 },
    Broadcast(String),
    Count(oneshot::Sender<usize>),
}

/// Handle to a room's chat hub
#[derive(Clone)]
pub struct ChatHub {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    client_buffer: usize,
}

/// One connected chat client
pub struct ChatMember {
    pub id: u64,
    messages: mpsc::Receiver<String>,
}

impl ChatMember {
    /// Next broadcast for this client. `None` once the hub dropped it.
    pub async fn recv(&mut self) -> Option<String> {
        self.messages.recv().await
    }
}

/// Replace inner newlines by spaces and trim.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.replace(['\r', '\n'], " ").trim().to_string()
}

impl ChatHub {
    /// Create a hub and spawn its loop. The loop ends when every handle is gone.
    #[must_use]
    pub fn spawn(client_buffer: usize) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            client_buffer: client_buffer.max(1),
        }
    }

    pub fn join(&self) -> Option<ChatMember> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, messages) = mpsc::channel(self.client_buffer);
        self.commands.send(Command::Register { id, tx }).ok()?;
        Some(ChatMember { id, messages })
    }

    pub fn leave(&self, id: u64) {
        let _ = self.commands.send(Command::Unregister { id });
    }

    /// Queue a message for every client. Blank messages are dropped.
    pub fn broadcast(&self, text: &str) -> bool {
        let message = normalize(text);
        if message.is_empty() {
            return false;
        }
        self.commands.send(Command::Broadcast(message)).is_ok()
    }

    pub async fn client_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut clients: HashMap<u64, mpsc::Sender<String>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { id, tx } => {
                clients.insert(id, tx);
            }
            Command::Unregister { id } => {
                clients.remove(&id);
            }
            Command::Broadcast(message) => {
                clients.retain(|id, tx| match tx.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(client_id = id, "Dropping chat client with a full queue");
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
            Command::Count(reply) => {
                let _ = reply.send(clients.len());
            }
        }
    }
    debug!("Chat hub stopped");
}
