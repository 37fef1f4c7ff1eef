//! Rune-range type and the shift/clip rules a change applies to any span
//! that refers to the same buffer (component C).

use std::cmp::{max, min};

/// A half-open range of rune offsets `[from, to)`.
///
/// `from <= to` is the normal invariant; [`Span::update`] is allowed to
/// produce a span where the endpoints momentarily cross during
/// recomputation, but it always collapses them before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// A zero-width span at `at`, denoting an insertion/selection point.
    pub const fn point(at: usize) -> Self {
        Self { from: at, to: at }
    }

    pub fn size(&self) -> usize {
        self.to - self.from
    }

    pub fn is_point(&self) -> bool {
        self.from == self.to
    }

    pub fn contains(&self, p: usize) -> bool {
        self.from <= p && p < self.to
    }

    /// Collapses this span to its `from` endpoint.
    pub fn collapsed_to_from(&self) -> Self {
        Self::point(self.from)
    }

    /// Collapses this span to its `to` endpoint.
    pub fn collapsed_to_to(&self) -> Self {
        Self::point(self.to)
    }

    /// Returns `self` adjusted for `changed` having been replaced with
    /// `new_size` runes, per spec.md §4.3.
    ///
    /// The endpoints are clipped independently: a `from` that falls inside
    /// `changed` is pulled forward to `changed.to` (the content it used to
    /// point into is gone, so the nearest surviving rune is just past the
    /// replacement); a `to` that falls inside `changed` is pulled back to
    /// `changed.from` (symmetric reasoning from the other side). If that
    /// leaves `from > to`, the span collapses to a point at `from`. Finally,
    /// any endpoint at or past `changed.to` shifts by
    /// `new_size - changed.size()`.
    pub fn update(&self, changed: Span, new_size: usize) -> Span {
        let mut from = Self::clip_from(self.from, changed);
        let mut to = Self::clip_to(self.to, changed);
        if from > to {
            to = from;
        }

        let d = new_size as isize - changed.size() as isize;
        if to >= changed.to {
            to = (to as isize + d).max(0) as usize;
        }
        if from >= changed.to {
            from = (from as isize + d).max(0) as usize;
        }

        Span { from, to }
    }

    fn clip_from(from: usize, changed: Span) -> usize {
        if from > changed.from && from <= changed.to {
            changed.to
        } else {
            from
        }
    }

    fn clip_to(to: usize, changed: Span) -> usize {
        if to >= changed.from && to < changed.to {
            changed.from
        } else {
            to
        }
    }

    /// The span spanning both `self` and `other`.
    pub fn union(&self, other: Span) -> Span {
        Span::new(min(self.from, other.from), max(self.to, other.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_entirely_after_self() {
        assert_eq!(Span::new(10, 20).update(Span::new(25, 30), 0), Span::new(10, 20));
    }

    #[test]
    fn changed_entirely_before_self_shifts() {
        assert_eq!(Span::new(10, 20).update(Span::new(0, 0), 100), Span::new(110, 120));
    }

    #[test]
    fn changed_fully_covers_self_collapses_and_shifts() {
        assert_eq!(Span::new(10, 20).update(Span::new(0, 15), 0), Span::new(0, 5));
        assert_eq!(Span::new(10, 20).update(Span::new(0, 15), 10), Span::new(10, 15));
        assert_eq!(Span::new(10, 20).update(Span::new(0, 40), 100), Span::new(100, 100));
    }

    #[test]
    fn changed_strictly_inside_self_grows_to_only() {
        assert_eq!(Span::new(10, 20).update(Span::new(12, 18), 100), Span::new(10, 114));
    }

    #[test]
    fn changed_overlaps_self_to_only() {
        assert_eq!(Span::new(10, 20).update(Span::new(15, 25), 20), Span::new(10, 15));
    }

    #[test]
    fn point_span_at_insertion_point_is_pushed_forward() {
        assert_eq!(Span::point(10).update(Span::point(10), 3), Span::point(13));
    }

    proptest::proptest! {
        #[test]
        fn update_never_crosses(
            sf in 0usize..200, sw in 0usize..50,
            cf in 0usize..200, cw in 0usize..50,
            new_size in 0usize..50,
        ) {
            let s = Span::new(sf, sf + sw);
            let c = Span::new(cf, cf + cw);
            let r = s.update(c, new_size);
            proptest::prop_assert!(r.from <= r.to);
        }

        #[test]
        fn update_disjoint_changed_after_is_identity(
            sf in 0usize..100, sw in 0usize..50, gap in 1usize..50, cw in 0usize..50, new_size in 0usize..50,
        ) {
            let s = Span::new(sf, sf + sw);
            let c = Span::new(s.to + gap, s.to + gap + cw);
            proptest::prop_assert_eq!(s.update(c, new_size), s);
        }
    }
}
