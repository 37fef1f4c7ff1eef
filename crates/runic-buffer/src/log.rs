//! Append-only change log and its navigation cursor (component B).
//!
//! Every applied or recorded change is appended as one [`LogEntry`]; entries
//! never move once written. Unlike the on-disk log spec.md §3 describes
//! (linked backward through a `prev` offset so a reader need not know its
//! own length up front), this one is `Vec`-backed and indexes directly,
//! since undo/redo journals and pending logs live only as long as an
//! editor handle and never grow large enough to need the disk's
//! linked-list economy. [`LogCursor`] still walks it in both directions
//! the same way a `prev`-linked reader would, and carries a *sticky*
//! error: once a navigation or I/O call fails, every subsequent call on
//! that cursor keeps returning the same error until [`LogCursor::reset`]
//! is called, matching spec.md §4.2's "a log with a bad entry refuses to
//! pretend to recover".

use crate::{BufferError, Span};

/// One recorded change: the span it replaces, the runes it replaces that
/// span with, and the apply sequence number it belongs to. Mirrors the
/// on-disk header (`prev`, `span.from`, `span.to`, `size`, `seq`) plus its
/// variable-length payload (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub span: Span,
    pub payload: Vec<char>,
    pub seq: u64,
}

impl LogEntry {
    pub fn new(span: Span, payload: Vec<char>, seq: u64) -> Self {
        Self { span, payload, seq }
    }

    pub fn new_size(&self) -> usize {
        self.payload.len()
    }
}

/// An in-memory, append-only sequence of [`LogEntry`] values.
///
/// This is deliberately `Vec`-backed rather than file-backed: private
/// pending logs (component E) and undo journals are short-lived and bounded
/// by the lifetime of an editor handle, unlike the buffer content itself.
#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    entries: Vec<LogEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn reset(&mut self, entries: Vec<LogEntry>) {
        self.entries = entries;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn first(&self) -> Option<&LogEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn at(&self, i: usize) -> Option<&LogEntry> {
        self.entries.get(i)
    }

    /// Returns the last contiguous run of entries sharing the final
    /// entry's `seq` — one undo/redo "frame".
    pub fn last_frame(&self) -> &[LogEntry] {
        let Some(last) = self.entries.last() else {
            return &[];
        };
        let seq = last.seq;
        let start = self
            .entries
            .iter()
            .rposition(|e| e.seq != seq)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.entries[start..]
    }

    /// Pops the last frame (all entries sharing the final `seq`) off the
    /// log and returns them in log (insertion) order, for folding into an
    /// undo or redo journal. Undo replays a frame in this order; redo
    /// replays it reversed (spec.md §4.6) — the caller decides, this just
    /// removes the frame.
    pub fn pop_frame(&mut self) -> Vec<LogEntry> {
        let frame_len = self.last_frame().len();
        let start = self.entries.len() - frame_len;
        self.entries.split_off(start)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of distinct frames (contiguous runs sharing a `seq`)
    /// currently held, oldest to newest.
    pub fn frame_count(&self) -> usize {
        let mut count = 0usize;
        let mut last_seq = None;
        for e in &self.entries {
            if last_seq != Some(e.seq) {
                count += 1;
                last_seq = Some(e.seq);
            }
        }
        count
    }

    /// Drops the oldest frames until at most `max_frames` remain, for
    /// the bounded-depth undo/redo discipline (SPEC_FULL.md §13).
    pub fn trim_front_frames(&mut self, max_frames: usize) {
        let total = self.frame_count();
        if total <= max_frames {
            return;
        }
        let mut to_drop = total - max_frames;
        let mut cut = 0usize;
        let mut last_seq = None;
        for e in &self.entries {
            if last_seq != Some(e.seq) {
                if to_drop == 0 {
                    break;
                }
                to_drop -= 1;
                last_seq = Some(e.seq);
            }
            cut += 1;
        }
        self.entries.drain(..cut);
    }

    /// Checks spec.md §4.2's ordering invariant: within one frame (shared
    /// `seq`), each entry's span must either equal the previous one's
    /// (two edits pending at the same address) or start at or after the
    /// previous one's end, since the engine's fix-up phase depends on
    /// applying them left-to-right without re-deriving offsets.
    pub fn check_frame_order(entries: &[LogEntry]) -> Result<(), BufferError> {
        for pair in entries.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.span == a.span {
                continue;
            }
            if b.span.from < a.span.to {
                return Err(BufferError::InvalidArgument);
            }
        }
        Ok(())
    }
}

/// A position within a [`ChangeLog`] that can step forward/backward and
/// carries a sticky error once one occurs.
pub struct LogCursor<'a> {
    log: &'a ChangeLog,
    pos: Option<usize>,
    error: Option<BufferError>,
}

impl<'a> LogCursor<'a> {
    pub fn new(log: &'a ChangeLog) -> Self {
        Self { log, pos: None, error: None }
    }

    fn sticky<T>(&mut self, result: Result<T, BufferError>) -> Result<T, BufferError> {
        if let Err(e) = &result {
            self.error = Some(e.clone());
        }
        result
    }

    fn check(&self) -> Result<(), BufferError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Clears the sticky error, repositioning the cursor before the first
    /// entry so callers can retry navigation from a known-good state.
    pub fn reset(&mut self) {
        self.pos = None;
        self.error = None;
    }

    pub fn next(&mut self) -> Result<&LogEntry, BufferError> {
        self.check()?;
        let next_pos = self.pos.map(|p| p + 1).unwrap_or(0);
        let result = self.log.at(next_pos).map(|_| ()).ok_or(BufferError::OutOfRange);
        self.sticky(result)?;
        self.pos = Some(next_pos);
        Ok(self.log.at(next_pos).unwrap())
    }

    pub fn prev(&mut self) -> Result<&LogEntry, BufferError> {
        self.check()?;
        let Some(pos) = self.pos else {
            let err: Result<(), BufferError> = Err(BufferError::OutOfRange);
            self.sticky(err)?;
            unreachable!()
        };
        if pos == 0 {
            let err: Result<(), BufferError> = Err(BufferError::OutOfRange);
            self.sticky(err)?;
            unreachable!()
        }
        self.pos = Some(pos - 1);
        Ok(self.log.at(pos - 1).unwrap())
    }

    pub fn at_end(&self) -> bool {
        match self.pos {
            None => self.log.is_empty(),
            Some(p) => p + 1 >= self.log.len(),
        }
    }

    pub fn load(&mut self, at: usize) -> Result<&LogEntry, BufferError> {
        self.check()?;
        let result = self.log.at(at).map(|_| ()).ok_or(BufferError::OutOfRange);
        self.sticky(result)?;
        self.pos = Some(at);
        Ok(self.log.at(at).unwrap())
    }
}
