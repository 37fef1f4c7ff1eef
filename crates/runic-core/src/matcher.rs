//! The regular-expression boundary (spec.md §1: "out of scope... the core
//! only needs `match(text, start) → [(begin,end),…]`").
//!
//! `runic-core` never depends on regex semantics directly; it depends on
//! this trait, so that swapping the regex dialect (or testing the address
//! evaluator against a hand-rolled stub) never touches the engine.

/// One match: a half-open rune range plus any captured subgroups, each
/// itself a half-open rune range (or `None` if the group did not
/// participate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub begin: usize,
    pub end: usize,
    pub groups: Vec<Option<(usize, usize)>>,
}

/// A compiled pattern capable of scanning a rune slice for matches.
pub trait Matcher {
    /// Finds the first match at or after rune offset `start`, scanning
    /// forward. Returns `None` if no match exists.
    fn find(&self, text: &[char], start: usize) -> Option<MatchResult>;

    /// Finds the last match ending at or before rune offset `start`,
    /// scanning backward — used by reverse-regexp addresses.
    fn rfind(&self, text: &[char], start: usize) -> Option<MatchResult> {
        let mut best: Option<MatchResult> = None;
        let mut from = 0usize;
        while from <= start {
            match self.find(text, from) {
                Some(m) if m.begin <= start => {
                    from = m.begin + 1;
                    best = Some(m);
                }
                _ => break,
            }
        }
        best
    }
}

/// A [`Matcher`] backed by the `regex` crate, operating over runes by
/// transcoding through a `String` and mapping byte offsets back to rune
/// offsets (the `regex` crate itself is byte-oriented).
pub struct RegexMatcher {
    inner: regex::Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, crate::EditError> {
        let inner = regex::Regex::new(pattern).map_err(|_| crate::EditError::BadRegexp)?;
        Ok(Self { inner })
    }

    fn byte_to_rune(s: &str, byte_offset: usize) -> usize {
        s[..byte_offset].chars().count()
    }
}

impl Matcher for RegexMatcher {
    fn find(&self, text: &[char], start: usize) -> Option<MatchResult> {
        let s: String = text.iter().collect();
        let byte_start = s
            .char_indices()
            .nth(start)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        let caps = self.inner.captures_at(&s, byte_start)?;
        let whole = caps.get(0)?;
        let begin = Self::byte_to_rune(&s, whole.start());
        let end = Self::byte_to_rune(&s, whole.end());
        let groups = (1..caps.len())
            .map(|i| {
                caps.get(i)
                    .map(|g| (Self::byte_to_rune(&s, g.start()), Self::byte_to_rune(&s, g.end())))
            })
            .collect();
        Some(MatchResult { begin, end, groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ascii_literal() {
        let m = RegexMatcher::new("H").unwrap();
        let text: Vec<char> = "Hello, World!".chars().collect();
        let found = m.find(&text, 0).unwrap();
        assert_eq!((found.begin, found.end), (0, 1));
    }

    #[test]
    fn finds_multibyte_pattern_by_rune_offset() {
        let m = RegexMatcher::new("世界").unwrap();
        let text: Vec<char> = "Hello, 世界!".chars().collect();
        let found = m.find(&text, 0).unwrap();
        assert_eq!((found.begin, found.end), (7, 9));
    }

    #[test]
    fn reverse_find_locates_last_match_at_or_before_start() {
        let m = RegexMatcher::new("H").unwrap();
        let text: Vec<char> = "Hello, World!".chars().collect();
        let found = m.rfind(&text, text.len()).unwrap();
        assert_eq!((found.begin, found.end), (0, 1));
    }

    #[test]
    fn no_match_returns_none() {
        let m = RegexMatcher::new("☺").unwrap();
        let text: Vec<char> = "Hello, 世界!".chars().collect();
        assert!(m.find(&text, 0).is_none());
    }

    #[test]
    fn captures_numbered_groups() {
        let m = RegexMatcher::new("(abc)(def)(ghi)").unwrap();
        let text: Vec<char> = "abcdefghi".chars().collect();
        let found = m.find(&text, 0).unwrap();
        assert_eq!(found.groups.len(), 3);
        assert_eq!(found.groups[0], Some((0, 3)));
        assert_eq!(found.groups[2], Some((6, 9)));
    }
}
