//! Events emitted by the readout driver.
//!
//! The driver reports everything it does over one unbounded channel: status
//! transitions, decoded cards, and a log of the wire traffic. The consumer
//! decides what to show; once it is gone, events are silently dropped.

use core::fmt;

use siread_common::punch::CardRecord;
use tokio::sync::mpsc::UnboundedSender;

/// Life cycle of the driver as shown to the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReaderStatus {
    Starting,
    /// Handshake succeeded.
    On,
    /// Waiting for a card to be inserted.
    Ready,
    /// A card is being read out.
    Processing,
    /// The current card failed to read; the station keeps running.
    ProcessingError(String),
    /// Startup or port failure; the driver is about to exit.
    FatalError(String),
    Off,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogDirection {
    Send,
    Read,
    Info,
    Error,
}

impl fmt::Display for LogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self {
            LogDirection::Send => "->",
            LogDirection::Read => "<-",
            LogDirection::Info => "--",
            LogDirection::Error => "!!",
        };
        write!(f, "{arrow}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    Status(ReaderStatus),
    CardRead(CardRecord),
    Log(LogDirection, String),
}

/// The driver's side of the event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: UnboundedSender<ReaderEvent>,
}

impl EventSender {
    pub fn new(tx: UnboundedSender<ReaderEvent>) -> Self {
        Self { tx }
    }

    pub fn status(&self, status: ReaderStatus) {
        let _ = self.tx.send(ReaderEvent::Status(status));
    }

    pub fn card_read(&self, record: CardRecord) {
        let _ = self.tx.send(ReaderEvent::CardRead(record));
    }

    pub fn log(&self, direction: LogDirection, text: impl Into<String>) {
        let _ = self.tx.send(ReaderEvent::Log(direction, text.into()));
    }
}
