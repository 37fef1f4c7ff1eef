//! Compositional address language and its evaluator (component D).
//!
//! An [`Address`] is a tagged sum over the variants spec'd in the design —
//! no dynamic dispatch, no trait objects for the AST itself, just a single
//! [`Address::evaluate`] match. The thing doing the matching against buffer
//! content is injected through the [`AddressContext`] and
//! [`crate::matcher::Matcher`] boundaries so this module never touches the
//! block store or the regex engine directly.

use std::fmt;

use runic_buffer::Span;

use crate::matcher::Matcher;
use crate::EditError;

/// Everything an [`Address`] needs from its evaluation environment.
pub trait AddressContext {
    fn size(&self) -> usize;
    /// Reads the runes in `[from, to)`. Addresses that need to scan text
    /// (regexp, line-walking) go through this rather than the block store
    /// directly, so the evaluator stays storage-agnostic.
    fn read(&self, from: usize, to: usize) -> Result<Vec<char>, EditError>;
    fn dot(&self) -> Span;
    fn set_dot(&mut self, span: Span);
    fn mark(&self, m: char) -> Result<Span, EditError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Dot,
    End,
    Rune(isize),
    Line(isize),
    Regexp { pattern: String, reverse: bool },
    Mark(char),
    Comma(Box<Address>, Box<Address>),
    Semi(Box<Address>, Box<Address>),
    Plus(Box<Address>, Box<Address>),
    Minus(Box<Address>, Box<Address>),
}

impl Address {
    pub fn line(n: isize) -> Self {
        Address::Line(n)
    }

    pub fn rune(n: isize) -> Self {
        Address::Rune(n)
    }

    pub fn regexp(pattern: impl Into<String>) -> Self {
        Address::Regexp { pattern: pattern.into(), reverse: false }
    }

    pub fn plus(self, rhs: Address) -> Self {
        Address::Plus(Box::new(self), Box::new(rhs))
    }

    pub fn minus(self, rhs: Address) -> Self {
        Address::Minus(Box::new(self), Box::new(rhs))
    }

    pub fn comma(self, rhs: Address) -> Self {
        Address::Comma(Box::new(self), Box::new(rhs))
    }

    pub fn semi(self, rhs: Address) -> Self {
        Address::Semi(Box::new(self), Box::new(rhs))
    }

    /// Negates `Line`/`Rune`, flips `Regexp`'s direction; a no-op on
    /// `Dot`/`End`/`Mark`. Defined over simple addresses only — the
    /// grammar never asks for the reverse of a compound one.
    pub fn reverse(&self) -> Self {
        match self {
            Address::Dot => Address::Dot,
            Address::End => Address::End,
            Address::Mark(m) => Address::Mark(*m),
            Address::Rune(n) => Address::Rune(-n),
            Address::Line(n) => Address::Line(-n),
            Address::Regexp { pattern, reverse } => {
                Address::Regexp { pattern: pattern.clone(), reverse: !reverse }
            }
            other => other.clone(),
        }
    }

    /// Evaluates this address starting from rune offset `from`.
    pub fn evaluate(
        &self,
        from: usize,
        ctx: &mut dyn AddressContext,
        matcher_for: &dyn Fn(&str) -> Result<Box<dyn Matcher>, EditError>,
    ) -> Result<Span, EditError> {
        match self {
            Address::Dot => {
                let d = ctx.dot();
                if d.to > ctx.size() {
                    return Err(EditError::OutOfRange);
                }
                Ok(d)
            }
            Address::End => Ok(Span::point(ctx.size())),
            Address::Rune(n) => {
                let target = from as isize + n;
                if target < 0 || target as usize > ctx.size() {
                    return Err(EditError::OutOfRange);
                }
                Ok(Span::point(target as usize))
            }
            Address::Line(n) => eval_line(*n, from, ctx),
            Address::Regexp { pattern, reverse } => {
                let matcher = matcher_for(pattern)?;
                let text = ctx.read(0, ctx.size())?;
                let found = if *reverse {
                    matcher.rfind(&text, from)
                } else {
                    matcher.find(&text, from)
                };
                match found {
                    Some(m) => Ok(Span::new(m.begin, m.end)),
                    None => Err(EditError::NoMatch),
                }
            }
            Address::Mark(m) => ctx.mark(*m),
            Address::Comma(a, b) => {
                let sa = a.evaluate(from, ctx, matcher_for)?;
                let sb = b.evaluate(from, ctx, matcher_for)?;
                Ok(Span::new(sa.from, sb.to))
            }
            Address::Semi(a, b) => {
                let sa = a.evaluate(from, ctx, matcher_for)?;
                let saved_dot = ctx.dot();
                ctx.set_dot(sa);
                match b.evaluate(sa.to, ctx, matcher_for) {
                    Ok(sb) => Ok(Span::new(sa.from, sb.to)),
                    Err(e) => {
                        ctx.set_dot(saved_dot);
                        Err(e)
                    }
                }
            }
            Address::Plus(a, b) => {
                let sa = a.evaluate(from, ctx, matcher_for)?;
                b.evaluate(sa.to, ctx, matcher_for)
            }
            Address::Minus(a, b) => {
                let sa = a.evaluate(from, ctx, matcher_for)?;
                b.reverse().evaluate(sa.from, ctx, matcher_for)
            }
        }
    }
}

/// Implements spec.md §4.4's `Line(n)`, reconstructed from the worked
/// examples in §8 rather than its (ambiguous) prose: `Line(0)` keeps
/// `from` exactly as given and extends `to` to the next newline
/// (inclusive) or end of buffer. `Line(n)` for `n > 0` instead starts
/// from the beginning of the line containing `from`, then walks forward
/// `n` full lines. `Line(-n)` walks backward symmetrically, landing on
/// the `n`-th full line before the one containing `from`.
fn eval_line(n: isize, from: usize, ctx: &mut dyn AddressContext) -> Result<Span, EditError> {
    let size = ctx.size();
    let text = ctx.read(0, size)?;
    let from = from.min(size);

    if n == 0 {
        return Ok(Span::new(from, find_newline_after(&text, from)));
    }

    if n > 0 {
        let mut cur_from = find_line_start(&text, from);
        let mut cur_to = find_newline_after(&text, cur_from);
        for _ in 1..n {
            if cur_to >= size {
                return Err(EditError::OutOfRange);
            }
            cur_from = cur_to;
            cur_to = find_newline_after(&text, cur_from);
        }
        Ok(Span::new(cur_from, cur_to))
    } else {
        let steps = (-n) as usize;
        let mut cur_line_end = find_line_start(&text, from);
        for i in 0..steps {
            if cur_line_end == 0 {
                return Err(EditError::OutOfRange);
            }
            let cur_line_start = find_line_start(&text, cur_line_end - 1);
            if i == steps - 1 {
                return Ok(Span::new(cur_line_start, cur_line_end));
            }
            cur_line_end = cur_line_start;
        }
        unreachable!()
    }
}

fn find_line_start(text: &[char], from: usize) -> usize {
    let mut i = from.min(text.len());
    while i > 0 && text[i - 1] != '\n' {
        i -= 1;
    }
    i
}

fn find_newline_after(text: &[char], start: usize) -> usize {
    let mut i = start;
    while i < text.len() && text[i] != '\n' {
        i += 1;
    }
    if i < text.len() {
        i + 1
    } else {
        i
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Dot => write!(f, "."),
            Address::End => write!(f, "$"),
            Address::Rune(n) if *n >= 0 => write!(f, "#{n}"),
            Address::Rune(n) => write!(f, "-#{}", -n),
            Address::Line(n) if *n >= 0 => write!(f, "{n}"),
            Address::Line(n) => write!(f, "-{}", -n),
            Address::Regexp { pattern, reverse } => {
                let delim = if *reverse { '?' } else { '/' };
                write!(f, "{delim}{pattern}{delim}")
            }
            Address::Mark(m) => write!(f, "'{m}"),
            Address::Comma(a, b) => write!(f, "{a},{b}"),
            Address::Semi(a, b) => write!(f, "{a};{b}"),
            Address::Plus(a, b) => write!(f, "{a}+{b}"),
            Address::Minus(a, b) => write!(f, "{a}-{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCtx {
        text: Vec<char>,
        dot: Span,
        marks: HashMap<char, Span>,
    }

    impl FakeCtx {
        fn new(text: &str) -> Self {
            Self { text: text.chars().collect(), dot: Span::point(0), marks: HashMap::new() }
        }
    }

    impl AddressContext for FakeCtx {
        fn size(&self) -> usize {
            self.text.len()
        }
        fn read(&self, from: usize, to: usize) -> Result<Vec<char>, EditError> {
            Ok(self.text[from..to].to_vec())
        }
        fn dot(&self) -> Span {
            self.dot
        }
        fn set_dot(&mut self, span: Span) {
            self.dot = span;
        }
        fn mark(&self, m: char) -> Result<Span, EditError> {
            self.marks.get(&m).copied().ok_or(EditError::BadMark)
        }
    }

    fn no_regex(_: &str) -> Result<Box<dyn Matcher>, EditError> {
        Err(EditError::BadRegexp)
    }

    fn with_regex(pattern: &'static str) -> impl Fn(&str) -> Result<Box<dyn Matcher>, EditError> {
        move |p: &str| {
            assert_eq!(p, pattern);
            Ok(Box::new(crate::matcher::RegexMatcher::new(pattern).unwrap()) as Box<dyn Matcher>)
        }
    }

    #[test]
    fn line_zero_from_middle_of_line() {
        let mut ctx = FakeCtx::new("abc\ndef");
        ctx.dot = Span::point(1);
        let got = Address::Line(0).evaluate(1, &mut ctx, &no_regex).unwrap();
        assert_eq!(got, Span::new(1, 4));
    }

    #[test]
    fn line_one_from_four() {
        let mut ctx = FakeCtx::new("abc\ndef");
        let got = Address::Line(1).evaluate(4, &mut ctx, &no_regex).unwrap();
        assert_eq!(got, Span::new(4, 7));
    }

    #[test]
    fn line_minus_one_from_four() {
        let mut ctx = FakeCtx::new("abc\ndef");
        let got = Address::Line(-1).evaluate(4, &mut ctx, &no_regex).unwrap();
        assert_eq!(got, Span::new(0, 4));
    }

    #[test]
    fn regexp_forward_and_multibyte() {
        let mut ctx = FakeCtx::new("Hello, 世界!");
        let got = Address::regexp("H").evaluate(0, &mut ctx, &with_regex("H")).unwrap();
        assert_eq!(got, Span::new(0, 1));
        let got = Address::regexp("世界").evaluate(0, &mut ctx, &with_regex("世界")).unwrap();
        assert_eq!(got, Span::new(7, 9));
    }

    #[test]
    fn regexp_no_match_fails() {
        let mut ctx = FakeCtx::new("Hello, 世界!");
        let got = Address::regexp("☺").evaluate(0, &mut ctx, &with_regex("☺"));
        assert!(matches!(got, Err(EditError::NoMatch)));
    }

    #[test]
    fn comma_spans_from_a_from_to_b_to() {
        let mut ctx = FakeCtx::new("abcdefghij");
        let a = Address::rune(2);
        let b = Address::rune(7);
        let got = a.comma(b).evaluate(0, &mut ctx, &no_regex).unwrap();
        assert_eq!(got, Span::new(2, 7));
    }

    #[test]
    fn display_round_trips_negative_rune() {
        let a = Address::Dot.minus(Address::rune(100));
        assert_eq!(Address::rune(-100).to_string(), "-#100");
        assert_eq!(a.to_string(), ".-#100");
    }
}
