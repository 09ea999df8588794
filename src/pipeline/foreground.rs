//! The interactive execution context.
//!
//! Whoever drains the [`ForegroundLoop`] and feeds the messages to the
//! controller is the interactive context. Background work never touches
//! controller state; it only posts a message here.

use tokio::sync::mpsc;

pub fn channel<M>() -> (Foreground<M>, ForegroundLoop<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Foreground { tx }, ForegroundLoop { rx })
}

/// Posts messages onto the interactive context, from any thread
#[derive(Debug)]
pub struct Foreground<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for Foreground<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> Foreground<M> {
    /// Returns false once the loop has been dropped
    pub fn post(&self, message: M) -> bool {
        self.tx.send(message).is_ok()
    }
}

#[derive(Debug)]
pub struct ForegroundLoop<M> {
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M> ForegroundLoop<M> {
    pub async fn next(&mut self) -> Option<M> {
        self.rx.recv().await
    }
}
