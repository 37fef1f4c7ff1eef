//! Address algebra, editor state, and the two-phase edit engine built on
//! top of `runic-buffer`'s disk-backed rune storage.
//!
//! Layout mirrors the component split in the design: [`address`] (D),
//! [`editor`] (E, plus the `Buffer` it hangs off), [`engine`] (F), and
//! [`edit`] (G). [`matcher`] is the regex boundary the address evaluator
//! and `Substitute` depend on without ever naming the `regex` crate
//! directly in their own signatures; [`parser`] is the thin, peripheral
//! recursive-descent front end for the concrete address grammar.

pub mod address;
pub mod edit;
pub mod editor;
pub mod engine;
pub mod matcher;
pub mod parser;

pub use address::Address;
pub use editor::{Buffer, Editor, EditorId, EditorReader, EditorWriter, EngineConfig};
pub use engine::{default_matcher_factory, EditContext, MatcherFactory};

/// Errors surfaced by address evaluation and the edit engine.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("offset out of range")]
    OutOfRange,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("mark rune not in [a-zA-Z.]")]
    BadMark,

    #[error("no match")]
    NoMatch,

    #[error("pending log violates the ordering invariant")]
    OutOfSequence,

    #[error("invalid regular expression")]
    BadRegexp,

    #[error("buffer or editor is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<runic_buffer::BufferError> for EditError {
    fn from(e: runic_buffer::BufferError) -> Self {
        match e {
            runic_buffer::BufferError::OutOfRange => EditError::OutOfRange,
            runic_buffer::BufferError::InvalidArgument => EditError::InvalidArgument,
            runic_buffer::BufferError::Closed => EditError::Closed,
            runic_buffer::BufferError::Io(err) => EditError::Io(err),
        }
    }
}
