//! Edit value types and their `Do` semantics (component G). Each is a data
//! value with a `to_source_string` and a record-phase body driven through
//! [`EditContext`]; the engine (component F) supplies the context and runs
//! fix-up/journal/apply/mark-update around it.

use std::fmt;
use std::io::Write as _;
use std::process::{Command, Stdio};

use runic_buffer::Span;

use crate::address::Address;
use crate::engine::{EditContext, MatcherFactory};
use crate::EditError;

/// Something that can run its record phase against an [`EditContext`] and
/// describe itself as source text.
pub trait Edit: fmt::Debug {
    fn to_source_string(&self) -> String;

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError>;
}

fn read_span(ctx: &dyn EditContext, span: Span) -> Result<Vec<char>, EditError> {
    ctx.read(span.from, span.to)
}

/// `Change(a, s)` — replace the runes addressed by `a` with `s`.
#[derive(Debug)]
pub struct Change {
    pub addr: Address,
    pub text: Vec<char>,
}

impl Edit for Change {
    fn to_source_string(&self) -> String {
        format!("{}c/{}/", self.addr, self.text.iter().collect::<String>())
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        ctx.pend(span, self.text.clone());
        Ok(span)
    }
}

/// `Append(a, s)` — insert `s` after `a` (collapses `a` to its `to`).
#[derive(Debug)]
pub struct Append {
    pub addr: Address,
    pub text: Vec<char>,
}

impl Edit for Append {
    fn to_source_string(&self) -> String {
        format!("{}a/{}/", self.addr, self.text.iter().collect::<String>())
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?.collapsed_to_to();
        ctx.pend(span, self.text.clone());
        // Return the raw collapsed point, not the post-insert span: fix-up
        // grows `at.to` through the same span-update algebra it applies to
        // this entry, and doing it here too would double the shift.
        Ok(span)
    }
}

/// `Insert(a, s)` — insert `s` before `a` (collapses `a` to its `from`).
#[derive(Debug)]
pub struct Insert {
    pub addr: Address,
    pub text: Vec<char>,
}

impl Edit for Insert {
    fn to_source_string(&self) -> String {
        format!("{}i/{}/", self.addr, self.text.iter().collect::<String>())
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?.collapsed_to_from();
        ctx.pend(span, self.text.clone());
        Ok(span)
    }
}

/// `Delete(a)` — replace the runes addressed by `a` with nothing.
#[derive(Debug)]
pub struct Delete {
    pub addr: Address,
}

impl Edit for Delete {
    fn to_source_string(&self) -> String {
        format!("{}d", self.addr)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        ctx.pend(span, Vec::new());
        // Fix-up collapses this to a point at `span.from` on its own: an
        // exact self-match shrinks to empty via the same span-update rule
        // every other span in the batch goes through.
        Ok(span)
    }
}

/// `Move(src, dst)` — relocate the runes addressed by `src` to after
/// `dst` (collapsed to its `to`). Rejected if `dst.from` falls strictly
/// inside `src`.
#[derive(Debug)]
pub struct Move {
    pub src: Address,
    pub dst: Address,
}

impl Edit for Move {
    fn to_source_string(&self) -> String {
        format!("{}m{}", self.src, self.dst)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let src = self.src.evaluate(0, ctx, matcher_for)?;
        let dst = self.dst.evaluate(0, ctx, matcher_for)?.collapsed_to_to();
        if src.from < dst.from && dst.from < src.to {
            return Err(EditError::InvalidArgument);
        }
        let moved = read_span(ctx, src)?;
        if dst.from >= src.to {
            ctx.pend(src, Vec::new());
            ctx.pend(dst, moved.clone());
        } else {
            ctx.pend(dst, moved.clone());
            ctx.pend(src, Vec::new());
        }
        // Raw `dst` point: fix-up walks both pended entries (the deletion
        // at `src` and the insertion at `dst`) and grows/shifts it itself.
        Ok(dst)
    }
}

/// `Copy(src, dst)` — duplicate the runes addressed by `src` to after
/// `dst` (collapsed to its `to`), leaving `src` untouched.
#[derive(Debug)]
pub struct Copy {
    pub src: Address,
    pub dst: Address,
}

impl Edit for Copy {
    fn to_source_string(&self) -> String {
        format!("{}t{}", self.src, self.dst)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let src = self.src.evaluate(0, ctx, matcher_for)?;
        let dst = self.dst.evaluate(0, ctx, matcher_for)?.collapsed_to_to();
        let copied = read_span(ctx, src)?;
        ctx.pend(dst, copied.clone());
        Ok(dst)
    }
}

/// `Set(a, m)` — assign mark `m` to the span addressed by `a`; the
/// buffer itself is untouched.
#[derive(Debug)]
pub struct SetMark {
    pub addr: Address,
    pub mark: char,
}

impl Edit for SetMark {
    fn to_source_string(&self) -> String {
        format!("{}k{}", self.addr, self.mark)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        ctx.set_mark_ctx(self.mark, span)?;
        Ok(span)
    }
}

/// `Print(a)` — copy the addressed runes to the print sink.
#[derive(Debug)]
pub struct Print {
    pub addr: Address,
}

impl Edit for Print {
    fn to_source_string(&self) -> String {
        format!("{}p", self.addr)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        let runes = read_span(ctx, span)?;
        ctx.print(&runes);
        Ok(span)
    }
}

/// `Where(a)` — emit `#from,#to` (rune offsets) to the print sink.
#[derive(Debug)]
pub struct Where {
    pub addr: Address,
}

impl Edit for Where {
    fn to_source_string(&self) -> String {
        format!("{}=#", self.addr)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        let text = format!("#{},#{}", span.from, span.to);
        ctx.print(&text.chars().collect::<Vec<_>>());
        Ok(span)
    }
}

/// `WhereLine(a)` — emit `l0,l1` (1-based inclusive line numbers), or a
/// single `l0` when start and end fall on the same line.
#[derive(Debug)]
pub struct WhereLine {
    pub addr: Address,
}

impl Edit for WhereLine {
    fn to_source_string(&self) -> String {
        format!("{}=", self.addr)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        let text_before = ctx.read(0, span.from)?;
        let l0 = 1 + text_before.iter().filter(|&&c| c == '\n').count();
        let text_mid = ctx.read(0, span.to)?;
        let l1 = 1 + text_mid.iter().filter(|&&c| c == '\n').count();
        let out = if l0 == l1 { format!("{l0}") } else { format!("{l0},{l1}") };
        ctx.print(&out.chars().collect::<Vec<_>>());
        Ok(span)
    }
}

/// `Substitute{a, regexp, with, global, from}` — regexp substitution
/// within the span addressed by `a`.
#[derive(Debug)]
pub struct Substitute {
    pub addr: Address,
    pub pattern: String,
    pub with: String,
    pub global: bool,
    pub from: i64,
}

impl Edit for Substitute {
    fn to_source_string(&self) -> String {
        let g = if self.global { "g" } else { "" };
        format!("{}s{}/{}/{}/{}", self.addr, self.from, self.pattern, self.with, g)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        let matcher = matcher_for(&self.pattern)?;
        let text = read_span(ctx, span)?;

        let skip = if self.from <= 0 { 0 } else { (self.from - 1) as usize };
        let mut scan_from = 0usize;
        let mut seen = 0usize;
        let mut last_match_end: Option<usize> = None;

        loop {
            let Some(m) = matcher.find(&text, scan_from) else { break };
            if Some(m.begin) == last_match_end && m.begin == m.end {
                scan_from = m.end + 1;
                continue;
            }
            if seen < skip {
                seen += 1;
                scan_from = if m.end > m.begin { m.end } else { m.end + 1 };
                last_match_end = Some(m.end);
                continue;
            }

            // Positions come straight off the immutable snapshot read
            // above, so they need no running delta: fix-up re-derives
            // each entry's effective position from the buffer's own
            // span-update algebra as it walks the pending batch.
            let replacement = expand_template(&self.with, &text, &m);
            let abs_begin = span.from + m.begin;
            let abs_end = span.from + m.end;
            ctx.pend(Span::new(abs_begin, abs_end), replacement);

            last_match_end = Some(m.end);
            scan_from = if m.end > m.begin { m.end } else { m.end + 1 };
            seen += 1;

            if !self.global {
                break;
            }
        }

        // Raw, untouched span: every match lies within it, so fix-up's
        // "changed strictly inside self" rule grows `.to` by each entry's
        // size delta while leaving `.from` fixed, exactly matching the
        // whole-match dot spec calls for.
        Ok(span)
    }
}

/// Expands `\0`..`\9` (whole match / numbered groups), `\n` (newline),
/// and `\\` (literal backslash) in a substitution template.
fn expand_template(template: &str, text: &[char], m: &crate::matcher::MatchResult) -> Vec<char> {
    let mut out = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(d) if d.is_ascii_digit() => {
                let idx = d.to_digit(10).unwrap() as usize;
                let range = if idx == 0 {
                    Some((m.begin, m.end))
                } else {
                    m.groups.get(idx - 1).copied().flatten()
                };
                if let Some((b, e)) = range {
                    out.extend_from_slice(&text[b..e]);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// `Pipe(a, cmd)` — run `cmd` in the host environment, optionally feeding
/// it the addressed span and/or replacing the span with its output. Not
/// part of the core per spec.md §1; kept here because its record-phase
/// shape (evaluate, maybe pend, maybe print) is identical to the other
/// edits.
#[derive(Debug)]
pub struct Pipe {
    pub addr: Address,
    pub cmd: String,
    pub send_input: bool,
    pub capture_output: bool,
}

impl Edit for Pipe {
    fn to_source_string(&self) -> String {
        let op = match (self.send_input, self.capture_output) {
            (true, true) => "|",
            (true, false) => "<",
            (false, true) => ">",
            (false, false) => "|",
        };
        format!("{}{}{}", self.addr, op, self.cmd)
    }

    fn record(&self, ctx: &mut dyn EditContext, matcher_for: &MatcherFactory) -> Result<Span, EditError> {
        let span = self.addr.evaluate(0, ctx, matcher_for)?;
        let input = if self.send_input { Some(read_span(ctx, span)?) } else { None };

        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(&self.cmd);
        command.stdin(if self.send_input { Stdio::piped() } else { Stdio::null() });
        command.stdout(if self.capture_output { Stdio::piped() } else { Stdio::inherit() });
        let mut child = command.spawn().map_err(EditError::Io)?;

        if let (Some(input), Some(stdin)) = (input, child.stdin.as_mut()) {
            let bytes: String = input.into_iter().collect();
            stdin.write_all(bytes.as_bytes()).map_err(EditError::Io)?;
        }

        let output = child.wait_with_output().map_err(EditError::Io)?;
        if self.capture_output {
            let replacement: Vec<char> = String::from_utf8_lossy(&output.stdout).chars().collect();
            ctx.pend(span, replacement);
            Ok(span)
        } else {
            Ok(span)
        }
    }
}

/// Top-level command value: either a recordable [`Edit`] driven through
/// the two-phase engine, or `Undo`/`Redo`, which bypass the record phase
/// entirely and replay buffer-level journals (spec.md §4.6).
pub enum EditCommand {
    Recordable(Box<dyn Edit>),
    Undo(usize),
    Redo(usize),
}

impl EditCommand {
    pub fn to_source_string(&self) -> String {
        match self {
            EditCommand::Recordable(e) => e.to_source_string(),
            EditCommand::Undo(n) => format!("u{n}"),
            EditCommand::Redo(n) => format!("r{n}"),
        }
    }

    pub fn perform(
        &self,
        editor: &crate::editor::Editor,
        matcher_for: &MatcherFactory,
        print_sink: &mut dyn FnMut(&[char]),
    ) -> Result<Span, EditError> {
        match self {
            EditCommand::Recordable(e) => editor.do_edit(e.as_ref(), matcher_for, print_sink),
            EditCommand::Undo(n) => editor.undo(*n),
            EditCommand::Redo(n) => editor.redo(*n),
        }
    }
}
