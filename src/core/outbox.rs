//! Outbound messages and the transport seam.
//!
//! The engine never talks to Telegram directly; it hands [`Outbound`]
//! messages to an [`Outbox`].

use async_trait::async_trait;

use crate::error::Result;

/// One inline button: visible label plus opaque callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Control {
    pub rows: Vec<Vec<Button>>,
}

impl Control {
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// A message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i32>,
    pub control: Option<Control>,
    /// Deliver without a notification sound.
    pub silent: bool,
}

impl Outbound {
    pub fn reply(chat_id: i64, reply_to: i32, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to: Some(reply_to),
            control: None,
            silent: false,
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.control = Some(control);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Where replies, notices and picker edits go.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Send a message, returning its message id.
    async fn send(&self, message: Outbound) -> Result<i32>;

    /// Replace the text and buttons of a message sent earlier.
    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        control: Option<&Control>,
    ) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex;

    /// An edit recorded by [`RecordingOutbox`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Edit {
        pub chat_id: i64,
        pub message_id: i32,
        pub text: String,
        pub control: Option<Control>,
    }

    /// Keeps everything in memory for assertions.
    #[derive(Default)]
    pub struct RecordingOutbox {
        pub sent: Mutex<Vec<Outbound>>,
        pub edits: Mutex<Vec<Edit>>,
        next_id: AtomicI32,
    }

    impl RecordingOutbox {
        pub fn new() -> Self {
            Self {
                next_id: AtomicI32::new(1000),
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<Outbound> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent().into_iter().map(|m| m.text).collect()
        }

        pub fn edits(&self) -> Vec<Edit> {
            self.edits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Outbox for RecordingOutbox {
        async fn send(&self, message: Outbound) -> Result<i32> {
            self.sent.lock().unwrap().push(message);
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn edit(
            &self,
            chat_id: i64,
            message_id: i32,
            text: &str,
            control: Option<&Control>,
        ) -> Result<()> {
            self.edits.lock().unwrap().push(Edit {
                chat_id,
                message_id,
                text: text.to_string(),
                control: control.cloned(),
            });
            Ok(())
        }
    }
}
