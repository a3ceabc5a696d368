use thiserror::Error;

/// The receiving actor has stopped
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0} mailbox closed")]
pub struct MailboxClosed(pub &'static str);
