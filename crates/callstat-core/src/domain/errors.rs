//! Errors returned by message handlers, classified for the consumer.

use std::error::Error as StdError;

/// ErrorKind decides how the consumer reacts to a failed handler.
///
/// - Retryable: declared processing failure, walks the requeue path
/// - Fatal: contract violation, stops the consumer and is never retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retryable,
    Fatal,
}

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// HandleError is what a [`crate::app::MessageHandler`] fails with.
#[derive(Debug)]
pub struct HandleError {
    kind: ErrorKind,
    message: String,
    source: Option<BoxError>,
}

impl HandleError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Retryable,
            message: message.into(),
            source: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Fatal,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }
}

impl std::fmt::Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} ({:?}): {}", self.message, self.kind, source),
            None => write!(f, "{} ({:?})", self.message, self.kind),
        }
    }
}

impl StdError for HandleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}
