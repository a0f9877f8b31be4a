//! Transient user-facing signals.
//!
//! These are the short notices the shell shows as toasts. They are never
//! persisted; the pipeline emits them and forgets them.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSignal {
    PermissionRequired,
    DecodeFailed,
    NoRegionSelected,
    CropFailed,
    SendFailed,
    Sent,
}

impl UserSignal {
    pub fn message(self) -> &'static str {
        match self {
            UserSignal::PermissionRequired => "permission required",
            UserSignal::DecodeFailed => "decode failed",
            UserSignal::NoRegionSelected => "no region selected",
            UserSignal::CropFailed => "crop failed",
            UserSignal::SendFailed => "send failed",
            UserSignal::Sent => "sent",
        }
    }

    pub fn is_failure(self) -> bool {
        !matches!(self, UserSignal::Sent)
    }
}

impl std::fmt::Display for UserSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Fan-in point for signals raised by the overlay and the pipeline.
///
/// Sending never blocks; if the shell has gone away the signal is dropped.
#[derive(Clone)]
pub struct SignalSink {
    tx: mpsc::UnboundedSender<UserSignal>,
}

impl SignalSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UserSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, signal: UserSignal) {
        if signal.is_failure() {
            log::warn!("[SIGNAL] {}", signal);
        } else {
            log::info!("[SIGNAL] {}", signal);
        }
        let _ = self.tx.send(signal);
    }
}
