//! Typed change notifications for the account collection.
//!
//! Subscribers get every mutation through one broadcast channel. Late
//! subscribers do not receive past events.

use crate::account::AccountRecord;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum AccountEvent {
    /// Collection membership or record contents changed (create, import,
    /// rename, delete, repair, balance refresh, load).
    AccountsChanged { accounts: Vec<AccountRecord> },
    /// The current-account pointer moved (delete reassignment, load
    /// fallback, switch).
    CurrentAccountChanged { current_id: Option<String> },
    /// An explicit switch completed; carries the newly current record.
    AccountSwitched { account: AccountRecord },
}

#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver<T> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Emits to all subscribers. No subscribers is not an error.
    pub fn emit(&self, event: T) {
        drop(self.sender.send(event));
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Debug)]
pub struct EventReceiver<T: Clone> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> EventReceiver<T> {
    pub async fn recv(&mut self) -> eyre::Result<T> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                Err(eyre::eyre!("event receiver lagged by {n} events"))
            }
            Err(broadcast::error::RecvError::Closed) => Err(eyre::eyre!("event bus closed")),
        }
    }

    /// Non-blocking drain step for test assertions.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

pub type AccountEventBus = EventBus<AccountEvent>;
