//! Detached write-back to the memory store.
//!
//! Chat logging and fact persistence never sit on the reply path. The
//! pipeline publishes commands to an unbounded channel; one background task
//! drains it in order and owns delivery. Failures are logged and dropped.

use crate::store::MemoryStore;
use crate::types::{AtomicFact, ChatRole};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// A unit of work for the background writer.
#[derive(Debug)]
enum Command {
    Log { role: ChatRole, content: String },
    Store(AtomicFact),
    Flush(oneshot::Sender<()>),
}

/// Handle used to publish write-backs without awaiting them.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Command>,
}

impl Outbox {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn<S>(store: Arc<S>) -> Self
    where
        S: MemoryStore + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Log { role, content } => {
                        if let Err(e) = store.log_chat(role, &content).await {
                            warn!(role = role.as_str(), error = %e, "chat log write failed");
                        }
                    }
                    Command::Store(fact) => match store.store_fact(&fact).await {
                        Ok(()) => debug!(owner = %fact.owner, importance = fact.importance, "fact stored"),
                        Err(e) => warn!(owner = %fact.owner, error = %e, "fact write failed"),
                    },
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("outbox closed");
        });

        Self { tx }
    }

    /// Queue a chat log line.
    pub fn log_chat(&self, role: ChatRole, content: impl Into<String>) {
        self.publish(Command::Log {
            role,
            content: content.into(),
        });
    }

    /// Queue a fact for persistence.
    pub fn store_fact(&self, fact: AtomicFact) {
        self.publish(Command::Store(fact));
    }

    /// Wait until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.publish(Command::Flush(done));
        let _ = wait.await;
    }

    fn publish(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("outbox writer is gone, dropping write-back");
        }
    }
}
