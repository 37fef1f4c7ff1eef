//! Disk-backed, block-cached rune storage: the bottom layer of the stack.
//!
//! This crate owns three things kept deliberately separate from the address
//! algebra and edit engine built on top of it in `runic-core`:
//!
//! - [`BlockStore`] (component A) — an unbounded rune sequence that keeps
//!   at most one block resident in memory regardless of buffer size.
//! - [`ChangeLog`] / [`LogCursor`] (component B) — an append-only record of
//!   changes applied to a buffer, with sticky-error cursor navigation.
//! - [`Span`] (component C) — the half-open rune range type and the
//!   shift/clip algebra every other span must apply when a change lands.

mod block;
mod log;
mod span;

pub use block::{BlockStore, BlockStoreConfig, Reader, Writer, DEFAULT_BLOCK_RUNES};
pub use log::{ChangeLog, LogCursor, LogEntry};
pub use span::Span;

/// A single Unicode scalar value. Buffers operate in runes, never bytes or
/// grapheme clusters (spec.md §3).
pub type Rune = char;

/// Errors surfaced by the block store and change log.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("offset out of range")]
    OutOfRange,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("buffer is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Clone for BufferError {
    fn clone(&self) -> Self {
        match self {
            Self::OutOfRange => Self::OutOfRange,
            Self::InvalidArgument => Self::InvalidArgument,
            Self::Closed => Self::Closed,
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}
