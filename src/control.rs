use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::params::LightParameters;

/// A request from outside the render loop, applied between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Set { name: String, value: f64 },
    Apply(LightParameters),
    Lightning { x: f32, y: f32, z: f32 },
    Shutdown,
}

/// Cloneable sender half handed to controllers (file watcher, tests, ...).
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: Sender<ControlMessage>,
    shutdown: Arc<AtomicBool>,
}

impl ControlHandle {
    /// Returns `false` once the render loop has gone away.
    pub fn send(&self, message: ControlMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn set(&self, name: impl Into<String>, value: f64) -> bool {
        self.send(ControlMessage::Set {
            name: name.into(),
            value,
        })
    }

    pub fn lightning(&self, x: f32, y: f32, z: f32) -> bool {
        self.send(ControlMessage::Lightning { x, y, z })
    }

    /// Ask the loop to stop. Works even when the channel is full of
    /// pending updates.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.sender.send(ControlMessage::Shutdown);
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

/// Receiver half owned by the render loop.
#[derive(Debug)]
pub struct ControlInbox {
    receiver: Receiver<ControlMessage>,
    shutdown: Arc<AtomicBool>,
}

impl ControlInbox {
    /// Every message queued right now, without waiting for more.
    pub fn drain(&self) -> Vec<ControlMessage> {
        let mut messages = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        messages
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

pub fn control_channel() -> (ControlHandle, ControlInbox) {
    let (sender, receiver) = mpsc::channel();
    let shutdown = Arc::new(AtomicBool::new(false));
    (
        ControlHandle {
            sender,
            shutdown: Arc::clone(&shutdown),
        },
        ControlInbox { receiver, shutdown },
    )
}

/// Route SIGINT and SIGTERM to the loop's shutdown flag.
pub fn install_signal_handlers(handle: &ControlHandle) -> Result<()> {
    let flag = handle.shutdown_flag();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&flag))
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{control_channel, ControlMessage};

    #[test]
    fn drain_returns_queued_messages_in_order_without_blocking() {
        let (handle, inbox) = control_channel();
        assert!(inbox.drain().is_empty());

        assert!(handle.set("rotation", 15.0));
        assert!(handle.lightning(1.0, 2.0, 3.0));
        assert_eq!(
            inbox.drain(),
            vec![
                ControlMessage::Set {
                    name: "rotation".to_owned(),
                    value: 15.0
                },
                ControlMessage::Lightning {
                    x: 1.0,
                    y: 2.0,
                    z: 3.0
                },
            ]
        );
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn shutdown_sets_flag_and_queues_message() {
        let (handle, inbox) = control_channel();
        assert!(!inbox.shutdown_requested());
        handle.shutdown();
        assert!(inbox.shutdown_requested());
        assert_eq!(inbox.drain(), vec![ControlMessage::Shutdown]);
    }

    #[test]
    fn send_reports_a_dropped_inbox() {
        let (handle, inbox) = control_channel();
        drop(inbox);
        assert!(!handle.set("detail", 1.0));
    }
}
