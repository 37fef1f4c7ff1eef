//! Buffer and editor state (component E), and the buffer-level journals
//! the edit engine drives.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use runic_buffer::{BlockStore, BlockStoreConfig, ChangeLog, Span};

use crate::EditError;

/// Valid mark runes: `.` (dot) plus letters.
pub fn is_valid_mark(m: char) -> bool {
    m == '.' || m.is_ascii_alphabetic()
}

/// Opaque identifier for an editor attached to a [`Buffer`]; stable for the
/// editor's lifetime, never reused (arena-style, spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditorId(pub(crate) u64);

/// The per-editor state the buffer keeps on its behalf: marks (including
/// `.`, dot) and nothing else — the pending log lives only for the
/// duration of one `do` (see `engine::RecordCtx`), so it is not stored
/// here between calls.
#[derive(Debug, Clone, Default)]
pub(crate) struct EditorRecord {
    pub(crate) marks: HashMap<char, Span>,
}

impl EditorRecord {
    fn dot(&self) -> Span {
        self.marks.get(&'.').copied().unwrap_or(Span::point(0))
    }
}

/// Configuration for a [`Buffer`]'s engine-level behavior, independent of
/// the block store's own `BlockStoreConfig` (SPEC_FULL.md §13).
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    /// Caps each journal (undo, redo) at this many frames, dropping the
    /// oldest once exceeded. `None` (the default) matches spec.md's
    /// "persist until popped" — unbounded.
    pub max_undo_frames: Option<usize>,
}

/// Buffer-internal state guarded by the reader-writer lock that realizes
/// the "multi-editor, parallel threads" discipline chosen for this crate
/// (spec.md §5; see SPEC_FULL.md for the rationale). The block store has
/// its own mutex because every read mutates its single-block cache —
/// reads under the buffer's shared lock still need exclusive access to
/// that cache, just not to the journals or editor marks.
pub(crate) struct BufferInner {
    pub(crate) content: Mutex<BlockStore>,
    pub(crate) undo: ChangeLog,
    pub(crate) redo: ChangeLog,
    pub(crate) seq: u64,
    pub(crate) editors: HashMap<EditorId, EditorRecord>,
    pub(crate) engine_config: EngineConfig,
    next_editor_id: u64,
}

/// A buffer: its backing file, undo/redo journals, and the attached
/// editors' marks. Always handed out behind an `Arc` so editors (and
/// threads) can share ownership.
pub struct Buffer {
    pub(crate) inner: RwLock<BufferInner>,
}

impl Buffer {
    /// Creates an empty buffer backed by `path` (lazily materialized on
    /// first write, per the block store's own contract).
    pub fn create(path: impl Into<PathBuf>) -> Arc<Buffer> {
        Self::with_config(path, BlockStoreConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: BlockStoreConfig) -> Arc<Buffer> {
        Self::with_configs(path, config, EngineConfig::default())
    }

    pub fn with_configs(
        path: impl Into<PathBuf>,
        config: BlockStoreConfig,
        engine_config: EngineConfig,
    ) -> Arc<Buffer> {
        Arc::new(Buffer {
            inner: RwLock::new(BufferInner {
                content: Mutex::new(BlockStore::new(path, config)),
                undo: ChangeLog::new(),
                redo: ChangeLog::new(),
                seq: 0,
                editors: HashMap::new(),
                engine_config,
                next_editor_id: 0,
            }),
        })
    }

    /// Attaches a new editor with an empty mark map (dot at the origin).
    pub fn attach_editor(self: &Arc<Self>) -> Editor {
        let mut inner = self.inner.write();
        let id = EditorId(inner.next_editor_id);
        inner.next_editor_id += 1;
        let mut marks = HashMap::new();
        marks.insert('.', Span::point(0));
        inner.editors.insert(id, EditorRecord { marks });
        Editor { id, buffer: Arc::clone(self) }
    }

    /// Detaches `editor`, dropping its marks. Other editors and the
    /// buffer's journals are unaffected.
    pub fn detach_editor(&self, editor: &Editor) {
        self.inner.write().editors.remove(&editor.id);
    }

    pub fn size(&self) -> usize {
        self.inner.read().content.lock().size()
    }

    pub fn seq(&self) -> u64 {
        self.inner.read().seq
    }

    /// Reads `[from, to)`. Takes the shared lock — concurrent reads from
    /// different editors may interleave, serialized only by the block
    /// store's own cache mutex.
    pub fn read(&self, from: usize, to: usize) -> Result<Vec<char>, EditError> {
        if to < from {
            return Err(EditError::InvalidArgument);
        }
        let mut buf = vec!['\0'; to - from];
        let inner = self.inner.read();
        inner.content.lock().read(&mut buf, from).map_err(EditError::from)?;
        Ok(buf)
    }

    /// Permanently closes the buffer: persists and deletes the backing
    /// file, drops every editor's marks, drains both journals.
    pub fn close(self: Arc<Self>) -> Result<(), EditError> {
        let mut inner = self.inner.write();
        inner.editors.clear();
        inner.undo.clear();
        inner.redo.clear();
        let store = std::mem::replace(
            &mut *inner.content.lock(),
            BlockStore::with_default_config(""),
        );
        store.close().map_err(EditError::from)
    }
}

/// A handle onto a [`Buffer`]: identity plus convenience accessors for
/// this editor's marks. The interesting logic — `do`, undo, redo — lives
/// in `engine.rs` as additional `impl Editor` blocks.
#[derive(Clone)]
pub struct Editor {
    pub(crate) id: EditorId,
    pub(crate) buffer: Arc<Buffer>,
}

impl Editor {
    pub fn id(&self) -> EditorId {
        self.id
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn dot(&self) -> Span {
        self.buffer
            .inner
            .read()
            .editors
            .get(&self.id)
            .map(EditorRecord::dot)
            .unwrap_or(Span::point(0))
    }

    pub fn mark(&self, m: char) -> Result<Span, EditError> {
        if !is_valid_mark(m) {
            return Err(EditError::BadMark);
        }
        let inner = self.buffer.inner.read();
        let rec = inner.editors.get(&self.id).ok_or(EditError::Closed)?;
        rec.marks.get(&m).copied().ok_or(EditError::BadMark)
    }

    pub fn set_mark(&self, m: char, span: Span) -> Result<(), EditError> {
        if !is_valid_mark(m) {
            return Err(EditError::BadMark);
        }
        let mut inner = self.buffer.inner.write();
        let size = inner.content.lock().size();
        if span.from > size || span.to > size {
            return Err(EditError::InvalidArgument);
        }
        let rec = inner.editors.get_mut(&self.id).ok_or(EditError::Closed)?;
        rec.marks.insert(m, span);
        Ok(())
    }

    /// Copies the runes in `span` out of the buffer (no cursor state; a
    /// fresh call always starts from `span.from`). Forward if
    /// `span.to >= span.from`; reverse (reading `[to, from)` and handing
    /// the runes back tail-first) when `span.from > span.to`, for
    /// reverse-direction consumers like `?regexp?` matching.
    pub fn rune_reader(&self, span: Span) -> Result<Vec<char>, EditError> {
        if span.from > span.to {
            let mut runes = self.buffer.read(span.to, span.from)?;
            runes.reverse();
            Ok(runes)
        } else {
            self.buffer.read(span.from, span.to)
        }
    }

    /// Forward streaming reader over `[span.from, span.to)`, reading one
    /// rune at a time through the block store's cache instead of
    /// materializing the span (spec.md §4.5).
    pub fn reader(&self, span: Span) -> Result<EditorReader, EditError> {
        let size = self.buffer.size();
        if span.to < span.from || span.to > size {
            return Err(EditError::InvalidArgument);
        }
        Ok(EditorReader { buffer: Arc::clone(&self.buffer), pos: span.from, end: span.to })
    }

    /// Appender whose insertion point advances as it writes, delegating
    /// straight into the block store (spec.md §4.5). This bypasses the
    /// edit engine's journal — it's the raw buffer-level primitive, not
    /// an undoable edit; callers that need undo/redo coverage should
    /// build an `Insert`/`Append` edit and drive it through `do_edit`
    /// instead.
    pub fn writer(&self, at: usize) -> Result<EditorWriter, EditError> {
        let size = self.buffer.size();
        if at > size {
            return Err(EditError::InvalidArgument);
        }
        Ok(EditorWriter { buffer: Arc::clone(&self.buffer), pos: at })
    }
}

/// See [`Editor::reader`].
pub struct EditorReader {
    buffer: Arc<Buffer>,
    pos: usize,
    end: usize,
}

impl Iterator for EditorReader {
    type Item = Result<char, EditError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let inner = self.buffer.inner.read();
        let r = inner.content.lock().rune(self.pos).map_err(EditError::from);
        self.pos += 1;
        Some(r)
    }
}

/// See [`Editor::writer`].
pub struct EditorWriter {
    buffer: Arc<Buffer>,
    pos: usize,
}

impl EditorWriter {
    pub fn push(&mut self, r: char) -> Result<(), EditError> {
        let inner = self.buffer.inner.read();
        inner.content.lock().insert(&[r], self.pos).map_err(EditError::from)?;
        self.pos += 1;
        Ok(())
    }
}
