//! Two-phase edit engine (component F): record → fix-up → journal → apply
//! → mark-update, plus undo/redo over the buffer-level journals.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use runic_buffer::{BlockStore, LogEntry, Span};

use crate::address::AddressContext;
use crate::editor::Editor;
use crate::matcher::Matcher;
use crate::EditError;

/// One change recorded during the record phase, before fix-up has
/// compensated its span for the entries ahead of it.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub span: Span,
    pub payload: Vec<char>,
}

/// Everything an [`crate::edit::Edit`] needs while it runs its record
/// phase: address evaluation plus the ability to pend changes, read/write
/// marks, and write to the print sink.
pub trait EditContext: AddressContext {
    fn pend(&mut self, span: Span, payload: Vec<char>);
    fn set_mark_ctx(&mut self, m: char, span: Span) -> Result<(), EditError>;
    fn print(&mut self, runes: &[char]);
}

/// Address/edit-context environment for a single `do` call's record
/// phase. Reads go straight through the block store's own single-block
/// cache rather than a pre-materialized snapshot, so the working memory
/// a `do` call needs stays proportional to what the edit actually reads,
/// not the whole buffer (spec.md §1). Marks are still cloned up front,
/// since they're small and nothing here is visible to other editors
/// until the engine commits it.
pub(crate) struct RecordCtx<'a> {
    store: &'a Mutex<BlockStore>,
    marks: HashMap<char, Span>,
    pub(crate) pending: Vec<PendingEntry>,
    print_sink: &'a mut dyn FnMut(&[char]),
}

impl<'a> RecordCtx<'a> {
    fn new(
        store: &'a Mutex<BlockStore>,
        marks: HashMap<char, Span>,
        print_sink: &'a mut dyn FnMut(&[char]),
    ) -> Self {
        Self { store, marks, pending: Vec::new(), print_sink }
    }
}

impl AddressContext for RecordCtx<'_> {
    fn size(&self) -> usize {
        self.store.lock().size()
    }

    fn read(&self, from: usize, to: usize) -> Result<Vec<char>, EditError> {
        if to < from {
            return Err(EditError::InvalidArgument);
        }
        let mut buf = vec!['\0'; to - from];
        self.store.lock().read(&mut buf, from).map_err(EditError::from)?;
        Ok(buf)
    }

    fn dot(&self) -> Span {
        self.marks.get(&'.').copied().unwrap_or(Span::point(0))
    }

    fn set_dot(&mut self, span: Span) {
        self.marks.insert('.', span);
    }

    fn mark(&self, m: char) -> Result<Span, EditError> {
        self.marks.get(&m).copied().ok_or(EditError::BadMark)
    }
}

impl EditContext for RecordCtx<'_> {
    fn pend(&mut self, span: Span, payload: Vec<char>) {
        self.pending.push(PendingEntry { span, payload });
    }

    fn set_mark_ctx(&mut self, m: char, span: Span) -> Result<(), EditError> {
        if !crate::editor::is_valid_mark(m) {
            return Err(EditError::BadMark);
        }
        self.marks.insert(m, span);
        Ok(())
    }

    fn print(&mut self, runes: &[char]) {
        (self.print_sink)(runes);
    }
}

pub type MatcherFactory<'a> = dyn Fn(&str) -> Result<Box<dyn Matcher>, EditError> + 'a;

/// The regex matcher factory used when callers don't need to inject a
/// custom one: compiles patterns through the `regex` crate.
pub fn default_matcher_factory(pattern: &str) -> Result<Box<dyn Matcher>, EditError> {
    Ok(Box::new(crate::matcher::RegexMatcher::new(pattern)?))
}

impl Editor {
    /// Performs `edit`'s `do` per spec.md §4.6, steps 1–8, retrying the
    /// whole record phase if the buffer's `seq` advances between record
    /// and apply (optimistic concurrency for the multi-editor discipline).
    pub fn do_edit(
        &self,
        edit: &dyn crate::edit::Edit,
        matcher_for: &MatcherFactory,
        print_sink: &mut dyn FnMut(&[char]),
    ) -> Result<Span, EditError> {
        loop {
            let (seq_observed, at0, mut pending) = {
                let inner = self.buffer.inner.read();
                let rec = inner.editors.get(&self.id).ok_or(EditError::Closed)?;
                let marks_snapshot = rec.marks.clone();
                let mut ctx = RecordCtx::new(&inner.content, marks_snapshot, print_sink);
                let at0 = edit.record(&mut ctx, matcher_for)?;
                (inner.seq, at0, ctx.pending)
            };

            {
                let mut inner = self.buffer.inner.write();
                if inner.seq != seq_observed {
                    warn!(seq_observed, seq_now = inner.seq, "buffer advanced during record, retrying");
                    continue;
                }

                let entries_for_check: Vec<LogEntry> = pending
                    .iter()
                    .map(|p| LogEntry::new(p.span, p.payload.clone(), inner.seq))
                    .collect();
                runic_buffer::ChangeLog::check_frame_order(&entries_for_check)
                    .map_err(|_| EditError::OutOfSequence)?;

                debug!(seq = inner.seq, entries = pending.len(), "record phase complete");

                // Fix-up phase: compensate `at` and every later entry's
                // span for each earlier entry, left to right.
                let mut at = at0;
                for i in 0..pending.len() {
                    let (span, size) = (pending[i].span, pending[i].payload.len());
                    if span.from == at.from {
                        at.to = at.update(span, size).to;
                    } else {
                        at = at.update(span, size);
                    }
                    for later in pending.iter_mut().skip(i + 1) {
                        later.span = later.span.update(span, size);
                    }
                }
                debug!(?at, "fix-up phase complete");

                // Journal + apply phases, interleaved per entry so the
                // inverse captures exactly the content about to be
                // overwritten in the buffer state at that point (the
                // fixed-up spans are only valid sequentially).
                let cur_seq = inner.seq;
                for p in &pending {
                    let mut store = inner.content.lock();
                    let mut old = vec!['\0'; p.span.size()];
                    store.read(&mut old, p.span.from).map_err(EditError::from)?;
                    drop(store);
                    inner.undo.append(LogEntry::new(
                        Span::new(p.span.from, p.span.from + p.payload.len()),
                        old,
                        cur_seq,
                    ));

                    let mut store = inner.content.lock();
                    store.delete(p.span.size(), p.span.from).map_err(EditError::from)?;
                    store
                        .insert_reader(p.span.from, p.payload.iter().copied().map(Ok))
                        .map_err(EditError::from)?;
                }
                inner.redo.clear();
                if let Some(max) = inner.engine_config.max_undo_frames {
                    inner.undo.trim_front_frames(max);
                }
                debug!(seq = cur_seq, entries = pending.len(), "journal + apply phases complete");

                // Mark update: propagate every applied (span, new_size)
                // through every editor's marks.
                for p in &pending {
                    for rec in inner.editors.values_mut() {
                        for m in rec.marks.values_mut() {
                            *m = m.update(p.span, p.payload.len());
                        }
                    }
                }
                debug!(seq = cur_seq, ?at, "mark-update phase complete");

                inner.seq += 1;
                if let Some(rec) = inner.editors.get_mut(&self.id) {
                    rec.marks.insert('.', at);
                }
                return Ok(at);
            }
        }
    }

    /// Undoes the last applied frame: pushes its inverse onto redo, then
    /// replays the frame onto the buffer in log order (spec.md §4.6).
    pub fn undo(&self, n: usize) -> Result<Span, EditError> {
        let mut last = Span::point(0);
        for _ in 0..n.max(1) {
            last = self.replay_frame(Journal::Undo)?;
        }
        Ok(last)
    }

    /// Redoes the last undone frame: symmetric to [`Editor::undo`], with
    /// the frame iterated in reverse of its insertion order.
    pub fn redo(&self, n: usize) -> Result<Span, EditError> {
        let mut last = Span::point(0);
        for _ in 0..n.max(1) {
            last = self.replay_frame(Journal::Redo)?;
        }
        Ok(last)
    }

    fn replay_frame(&self, which: Journal) -> Result<Span, EditError> {
        let mut inner = self.buffer.inner.write();

        let mut frame = match which {
            Journal::Undo => inner.undo.pop_frame(),
            Journal::Redo => inner.redo.pop_frame(),
        };
        if frame.is_empty() {
            return Err(EditError::InvalidArgument);
        }
        if matches!(which, Journal::Redo) {
            frame.reverse();
        }

        let cur_seq = inner.seq;
        let mut affected = Span::point(0);
        let mut first = true;
        for entry in &frame {
            let mut store = inner.content.lock();
            let mut old = vec!['\0'; entry.span.size()];
            store.read(&mut old, entry.span.from).map_err(EditError::from)?;
            drop(store);

            let inverse = LogEntry::new(
                Span::new(entry.span.from, entry.span.from + entry.payload.len()),
                old,
                cur_seq,
            );
            match which {
                Journal::Undo => inner.redo.append(inverse),
                Journal::Redo => inner.undo.append(inverse),
            }

            let mut store = inner.content.lock();
            store.delete(entry.span.size(), entry.span.from).map_err(EditError::from)?;
            store
                .insert_reader(entry.span.from, entry.payload.iter().copied().map(Ok))
                .map_err(EditError::from)?;
            drop(store);

            for rec in inner.editors.values_mut() {
                for m in rec.marks.values_mut() {
                    *m = m.update(entry.span, entry.payload.len());
                }
            }

            let new_span = Span::new(entry.span.from, entry.span.from + entry.payload.len());
            affected = if first { new_span } else { affected.union(new_span) };
            first = false;
        }

        if let Some(max) = inner.engine_config.max_undo_frames {
            match which {
                Journal::Undo => inner.redo.trim_front_frames(max),
                Journal::Redo => inner.undo.trim_front_frames(max),
            }
        }

        inner.seq += 1;
        debug!(?which, seq = cur_seq, entries = frame.len(), ?affected, "undo/redo frame applied");
        if let Some(rec) = inner.editors.get_mut(&self.id) {
            rec.marks.insert('.', affected);
        }
        Ok(affected)
    }
}

#[derive(Debug)]
enum Journal {
    Undo,
    Redo,
}
