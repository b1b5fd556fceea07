//! Binary function of integer: the interval algebra behind time schedules.
//!
//! A `Bfi` is a set of half-open integer segments `[start, end)` over which
//! the function is true, together with a domain `[lo, hi)` outside which the
//! function is unknown. Time conditions evaluate schedules expressed this
//! way, but nothing here is specific to time; any ordered integer axis
//! works.
//!
//! Segments are kept ordered by `(start, end)` and may overlap or repeat;
//! the boolean operations normalize as they go. The `*_edge` variants keep
//! the zero-length boundary between adjacent true segments instead of
//! coalescing them, which matters for schedules that must re-fire at the
//! instant one interval hands off to the next.
//!
//! All algorithms are linear in the number of segments of their inputs.

use std::fmt;

use thiserror::Error;

use crate::value::Truth;

/// One true segment: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seg {
    pub start: i64,
    pub end: i64,
}

/// A binary function of integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bfi {
    lo: i64,
    hi: i64,
    segs: Vec<Seg>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule literal has no domain separator ':' in {0:?}")]
    MissingDomain(String),
    #[error("schedule element {0:?} is not an integer interval")]
    BadElement(String),
    #[error("index element {0:?} is not an integer or integer pair")]
    BadIndex(String),
}

fn parse_int(s: &str) -> Result<i64, ScheduleError> {
    s.trim()
        .parse()
        .map_err(|_| ScheduleError::BadElement(s.to_string()))
}

/// Parse one `a`, or `a_b` element into a half-open segment. The text form
/// is inclusive on both ends: `10_12` covers the integers 10, 11, and 12.
fn parse_element(s: &str) -> Result<Seg, ScheduleError> {
    match s.split_once('_') {
        Some((a, b)) => {
            let start = parse_int(a)?;
            let end = parse_int(b)? + 1;
            Ok(Seg { start, end })
        }
        None => {
            let start = parse_int(s)?;
            Ok(Seg {
                start,
                end: start + 1,
            })
        }
    }
}

impl Bfi {
    /// Empty function over the given domain (false everywhere within it).
    pub fn new(a: i64, b: i64) -> Bfi {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Bfi {
            lo,
            hi,
            segs: Vec::new(),
        }
    }

    /// Domain shared by two functions: the intersection of their domains,
    /// collapsed to empty when they do not meet.
    pub fn domain_of(g: &Bfi, h: &Bfi) -> Bfi {
        let lo = g.lo.max(h.lo);
        let hi = g.hi.min(h.hi).max(lo);
        Bfi::new(lo, hi)
    }

    pub fn domain(&self) -> (i64, i64) {
        (self.lo, self.hi)
    }

    pub fn segments(&self) -> &[Seg] {
        &self.segs
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// Add a segment, keeping the list ordered by `(start, end)`.
    /// Duplicates are allowed.
    pub fn insert(&mut self, start: i64, end: i64) {
        let pos = self
            .segs
            .iter()
            .rposition(|s| s.start < start || (s.start == start && s.end <= end))
            .map_or(0, |i| i + 1);
        self.segs.insert(pos, Seg { start, end });
    }

    /// Add a segment unless an identical one is already present.
    pub fn insert_unique(&mut self, start: i64, end: i64) {
        if !self.segs.iter().any(|s| s.start == start && s.end == end) {
            self.insert(start, end);
        }
    }

    /// Parse the literal form `A_B:a_b,c,d_e`. The part before the colon is
    /// the domain, the rest the true segments; both are inclusive in text
    /// form, so `10_20:12_15` has domain `[10,21)` and one segment
    /// `[12,16)`.
    pub fn parse(text: &str) -> Result<Bfi, ScheduleError> {
        let (domain, rest) = text
            .split_once(':')
            .ok_or_else(|| ScheduleError::MissingDomain(text.to_string()))?;
        let dom = parse_element(domain)?;
        let mut f = Bfi::new(dom.start, dom.end);
        if !rest.is_empty() {
            for element in rest.split(',') {
                let seg = parse_element(element)?;
                f.insert(seg.start, seg.end);
            }
        }
        Ok(f)
    }

    /// Truth at a point: unknown outside the domain, true inside a segment,
    /// false elsewhere in the domain.
    pub fn eval(&self, i: i64) -> Truth {
        if i < self.lo || i >= self.hi {
            return Truth::Unknown;
        }
        for s in &self.segs {
            if i < s.start {
                return Truth::False;
            }
            if i < s.end {
                return Truth::True;
            }
        }
        Truth::False
    }

    /// Smallest boundary strictly greater than `t`, with the truth the
    /// function takes on from that boundary. None when no boundary remains.
    pub fn next_change(&self, t: i64) -> Option<(i64, bool)> {
        let n = self.or_();
        for s in &n.segs {
            if t < s.start {
                return Some((s.start, true));
            }
            if t < s.end {
                return Some((s.end, false));
            }
        }
        None
    }

    /// Boolean `or` over one set: coalesce overlapping and adjacent
    /// segments.
    pub fn or_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        for s in &self.segs {
            match f.segs.last_mut() {
                Some(last) if last.end >= s.start => {
                    if last.end < s.end {
                        last.end = s.end;
                    }
                }
                _ => f.segs.push(*s),
            }
        }
        f
    }

    /// Boolean `or` preserving edges: overlapping segments merge but
    /// adjacent ones keep their shared boundary.
    pub fn or_edge_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        for s in &self.segs {
            match f.segs.last_mut() {
                Some(last) if last.end > s.start => {
                    if last.end < s.end {
                        last.end = s.end;
                    }
                }
                _ => f.segs.push(*s),
            }
        }
        f
    }

    /// Boolean `and` over one set: the pairwise overlaps of its segments.
    pub fn and_(&self) -> Bfi {
        let mut h = Bfi::new(self.lo, self.hi);
        for (i, s) in self.segs.iter().enumerate() {
            for t in &self.segs[i + 1..] {
                if t.start >= s.end {
                    break;
                }
                h.insert(t.start, s.end.min(t.end));
            }
        }
        h.or_()
    }

    /// Boolean `not` within the domain. The complement of an empty set is
    /// true across the whole domain.
    pub fn not_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        if self.segs.is_empty() {
            if self.hi > self.lo {
                f.insert(self.lo, self.hi);
            }
            return f;
        }
        let h = self.or_();
        if self.lo < h.segs[0].start {
            f.insert(self.lo, h.segs[0].start);
        }
        for (i, s) in h.segs.iter().enumerate() {
            if s.end >= self.hi {
                return f;
            }
            let next_start = h.segs.get(i + 1).map_or(self.hi, |n| n.start);
            if s.end < next_start {
                f.insert(s.end, next_start);
            }
        }
        f
    }

    /// Boolean `xor` over one set.
    pub fn xor_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        let Some(first) = self.segs.first() else {
            return f;
        };
        let mut start = first.start;
        let mut end = first.end;
        for s in &self.segs[1..] {
            if end == s.start {
                // adjoining segments connect
                end = s.end;
            } else if end < s.start {
                f.insert(start, end);
                start = s.start;
                end = s.end;
            } else if start < s.start {
                f.insert(start, s.start);
                if end > s.end {
                    start = s.end;
                } else {
                    start = end;
                    end = s.end;
                }
            }
        }
        if end > start {
            f.insert(start, end);
        }
        f
    }

    /// Boolean `xor` preserving edges: adjoining segments do not connect.
    pub fn xor_edge_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        let Some(first) = self.segs.first() else {
            return f;
        };
        let mut start = first.start;
        let mut end = first.end;
        for s in &self.segs[1..] {
            if end <= s.start {
                f.insert(start, end);
                start = s.start;
                end = s.end;
            } else if start < s.start {
                f.insert(start, s.start);
                if end > s.end {
                    start = s.end;
                } else {
                    start = end;
                    end = s.end;
                }
            }
        }
        if end > start {
            f.insert(start, end);
        }
        f
    }

    /// Clip segments to the domain; segments wholly outside are dropped.
    pub fn known(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        let mut iter = self.segs.iter().peekable();
        while let Some(s) = iter.peek() {
            if s.start > self.lo {
                break;
            }
            if s.end > self.lo {
                f.insert(self.lo, s.end.min(self.hi));
            }
            iter.next();
        }
        while let Some(s) = iter.peek() {
            if s.end >= self.hi {
                break;
            }
            f.insert(s.start, s.end);
            iter.next();
        }
        while let Some(s) = iter.peek() {
            if s.start >= self.hi {
                break;
            }
            f.insert(s.start, self.hi);
            iter.next();
        }
        f
    }

    /// Partition: each segment runs until the start of the next, and the
    /// first and last stretch to the domain edges. An empty set partitions
    /// into the whole domain.
    pub fn until_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        let Some(first) = self.segs.first() else {
            f.insert(self.lo, self.hi);
            return f;
        };
        if self.lo < first.start {
            f.insert(self.lo, first.start);
        }
        for (i, s) in self.segs.iter().enumerate() {
            match self.segs.get(i + 1) {
                Some(next) => {
                    if s.start < next.start {
                        f.insert(s.start, next.start);
                    }
                }
                None => {
                    if s.end < self.hi {
                        f.insert(s.start, self.hi);
                    } else {
                        f.insert(s.start, s.end);
                    }
                }
            }
        }
        f
    }

    /// Soft partition: a segment is truncated at the next start only when
    /// it actually overlaps the next segment.
    pub fn yield_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        if self.segs.is_empty() {
            return f;
        }
        for (i, s) in self.segs.iter().enumerate() {
            match self.segs.get(i + 1) {
                Some(next) => {
                    if s.start < next.start {
                        if s.end > next.start {
                            f.insert(s.start, next.start);
                        } else {
                            f.insert(s.start, s.end);
                        }
                    }
                }
                None => f.insert(s.start, s.end),
            }
        }
        f
    }

    /// Segments that overlap at least one other segment of the same set.
    pub fn conflict_(&self) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        for (i, s) in self.segs.iter().enumerate() {
            let overlapping: Vec<&Seg> = self.segs[i + 1..]
                .iter()
                .take_while(|t| t.start < s.end)
                .collect();
            if !overlapping.is_empty() {
                f.insert_unique(s.start, s.end);
                for t in overlapping {
                    f.insert_unique(t.start, t.end);
                }
            }
        }
        f
    }

    /// Segments of `self` that intersect no segment of `h`.
    pub fn reject(&self, h: &Bfi) -> Bfi {
        if self.segs.is_empty() || h.segs.is_empty() {
            return self.clone();
        }
        let mut f = Bfi::domain_of(self, h);
        let hh = h.or_();
        let mut ti = 0usize;
        for s in &self.segs {
            while s.end <= hh.segs[ti].start && ti > 0 {
                ti -= 1;
            }
            while s.start >= hh.segs[ti].end && ti + 1 < hh.segs.len() {
                ti += 1;
            }
            if s.start >= hh.segs[ti].end || s.end <= hh.segs[ti].start {
                f.insert(s.start, s.end);
            }
        }
        f
    }

    /// Segments of `self` that intersect any segment of `h`.
    pub fn select(&self, h: &Bfi) -> Bfi {
        let mut f = Bfi::domain_of(self, h);
        let hh = h.or_();
        if hh.segs.is_empty() {
            return f;
        }
        let mut ti = 0usize;
        for s in &self.segs {
            while s.start >= hh.segs[ti].end && ti + 1 < hh.segs.len() {
                ti += 1;
            }
            if s.start < hh.segs[ti].end && s.end > hh.segs[ti].start {
                f.insert(s.start, s.end);
            }
        }
        f
    }

    /// Unnormalized concatenation in segment order.
    pub fn union(&self, h: &Bfi) -> Bfi {
        let mut f = Bfi::domain_of(self, h);
        let mut si = self.segs.iter().peekable();
        let mut ti = h.segs.iter().peekable();
        loop {
            match (si.peek(), ti.peek()) {
                (Some(s), Some(t)) => {
                    if (s.start, s.end) <= (t.start, t.end) {
                        f.segs.push(**s);
                        si.next();
                    } else {
                        f.segs.push(**t);
                        ti.next();
                    }
                }
                (Some(s), None) => {
                    f.segs.push(**s);
                    si.next();
                }
                (None, Some(t)) => {
                    f.segs.push(**t);
                    ti.next();
                }
                (None, None) => break,
            }
        }
        f
    }

    /// Truncate each segment of `self` at the start of the next `h`
    /// segment.
    pub fn until(&self, h: &Bfi) -> Bfi {
        let mut f = Bfi::domain_of(self, h);
        let mut ti = 0usize; // h.segs.len() plays the domain sentinel
        for s in &self.segs {
            loop {
                let t_start = h.segs.get(ti).map_or(h.hi, |t| t.start);
                if s.start < t_start {
                    break;
                }
                if ti == h.segs.len() {
                    return f;
                }
                ti += 1;
            }
            match h.segs.get(ti) {
                Some(t) => f.insert(s.start, t.start),
                None => f.insert(s.start, s.end),
            }
        }
        f
    }

    /// Like [`Bfi::until`], but keep a segment whole when it does not reach
    /// the truncating start.
    pub fn yield_at(&self, h: &Bfi) -> Bfi {
        let mut f = Bfi::domain_of(self, h);
        let mut ti = 0usize;
        for s in &self.segs {
            loop {
                let t_start = h.segs.get(ti).map_or(h.hi, |t| t.start);
                if s.start < t_start {
                    break;
                }
                if ti == h.segs.len() {
                    return f;
                }
                ti += 1;
            }
            match h.segs.get(ti) {
                Some(t) if s.end > t.start => f.insert(s.start, t.start),
                _ => f.insert(s.start, s.end),
            }
        }
        f
    }

    /// Logical `and` of two functions.
    pub fn and(&self, h: &Bfi) -> Bfi {
        self.or_().union(&h.or_()).and_()
    }

    /// Logical `or` of two functions, reduced.
    pub fn or(&self, h: &Bfi) -> Bfi {
        self.union(h).or_()
    }

    /// Logical `or` preserving edges.
    pub fn or_edge(&self, h: &Bfi) -> Bfi {
        self.union(h).or_edge_()
    }

    /// Logical `xor` of two functions.
    pub fn xor(&self, h: &Bfi) -> Bfi {
        self.or_().union(&h.or_()).xor_()
    }

    /// Logical `xor` preserving edges.
    pub fn xor_edge(&self, h: &Bfi) -> Bfi {
        self.or_edge_().union(&h.or_edge_()).xor_edge_()
    }

    pub fn nand(&self, h: &Bfi) -> Bfi {
        self.and(h).not_()
    }

    pub fn nor(&self, h: &Bfi) -> Bfi {
        self.or(h).not_()
    }

    /// Pick segments by position. Segments are counted among those that
    /// intersect the domain interior; positive positions count from the
    /// start, negative from the end.
    pub fn index(&self, index: &SegIndex) -> Bfi {
        let mut f = Bfi::new(self.lo, self.hi);
        let inside: Vec<Seg> = self
            .segs
            .iter()
            .filter(|s| s.start < self.hi && s.end > self.lo)
            .copied()
            .collect();
        let n = inside.len() as i64;
        for part in &index.parts {
            let (from, to, span) = match *part {
                IndexPart::Single(i) => (i, i, false),
                IndexPart::Range(i, j) => (i, j, false),
                IndexPart::Span(i, j) => (i, j, true),
            };
            let mut j = if from < 0 { from + n } else { from - 1 };
            let mut k = if to < 0 { to + n } else { to - 1 };
            if k >= n {
                k = n - 1;
            }
            if j < 0 {
                j = 0;
            }
            if j >= n || k < 0 || k < j {
                continue;
            }
            let picked = &inside[j as usize..=k as usize];
            if span {
                let start = picked[0].start;
                let end = picked.iter().map(|s| s.end).max().unwrap_or(picked[0].end);
                f.insert(start, end);
            } else {
                for s in picked {
                    f.insert(s.start, s.end);
                }
            }
        }
        f
    }

    /// Apply an index within each segment of `h` that spans the domain
    /// interior of `self`, collecting the unique picks.
    pub fn indexed_select(&self, h: &Bfi, index: &SegIndex) -> Bfi {
        let mut f = Bfi::domain_of(self, h);
        for t in &h.segs {
            if t.start < self.hi && t.end > self.lo {
                let mut window = self.clone();
                window.lo = t.start;
                window.hi = t.end;
                let picked = window.index(index);
                for s in &picked.segs {
                    f.insert_unique(s.start, s.end);
                }
            }
        }
        f
    }
}

impl fmt::Display for Bfi {
    /// Inclusive text form, the inverse of [`Bfi::parse`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}:", self.lo, self.hi - 1)?;
        for (i, s) in self.segs.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if s.end == s.start + 1 {
                write!(f, "{}", s.start)?;
            } else {
                write!(f, "{}_{}", s.start, s.end - 1)?;
            }
        }
        Ok(())
    }
}

/// Segment index expression: `n`, `n..n` (copy a range of segments), or
/// `n_n` (span a range into one segment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPart {
    Single(i64),
    Range(i64, i64),
    Span(i64, i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegIndex {
    parts: Vec<IndexPart>,
}

impl SegIndex {
    pub fn parse(text: &str) -> Result<SegIndex, ScheduleError> {
        let mut parts = Vec::new();
        for element in text.split(',') {
            let part = if let Some((a, b)) = element.split_once("..") {
                IndexPart::Range(
                    a.parse()
                        .map_err(|_| ScheduleError::BadIndex(element.to_string()))?,
                    b.parse()
                        .map_err(|_| ScheduleError::BadIndex(element.to_string()))?,
                )
            } else if let Some((a, b)) = element.split_once('_') {
                IndexPart::Span(
                    a.parse()
                        .map_err(|_| ScheduleError::BadIndex(element.to_string()))?,
                    b.parse()
                        .map_err(|_| ScheduleError::BadIndex(element.to_string()))?,
                )
            } else {
                IndexPart::Single(
                    element
                        .trim()
                        .parse()
                        .map_err(|_| ScheduleError::BadIndex(element.to_string()))?,
                )
            };
            parts.push(part);
        }
        Ok(SegIndex { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bfi(text: &str) -> Bfi {
        match Bfi::parse(text) {
            Ok(f) => f,
            Err(e) => panic!("bad literal {text:?}: {e}"),
        }
    }

    #[test]
    fn parse_and_display_round_trip() {
        for text in ["10_20:12_15", "0_100:", "0_9:1,3_5,7", "-10_10:-5_-1"] {
            assert_eq!(bfi(text).to_string(), text);
        }
    }

    #[test]
    fn parse_without_domain_is_an_error() {
        assert!(matches!(
            Bfi::parse("1_2,3_4"),
            Err(ScheduleError::MissingDomain(_))
        ));
        assert!(matches!(
            Bfi::parse("0_9:x_y"),
            Err(ScheduleError::BadElement(_))
        ));
    }

    #[test]
    fn eval_is_unknown_outside_domain() {
        let f = bfi("10_20:12_15");
        assert_eq!(f.eval(9), Truth::Unknown);
        assert_eq!(f.eval(21), Truth::Unknown);
        assert_eq!(f.eval(10), Truth::False);
        assert_eq!(f.eval(12), Truth::True);
        assert_eq!(f.eval(15), Truth::True); // inclusive text form
        assert_eq!(f.eval(16), Truth::False);
    }

    #[test]
    fn empty_set_is_false_across_domain() {
        let f = bfi("0_9:");
        for i in 0..10 {
            assert_eq!(f.eval(i), Truth::False);
        }
        assert_eq!(f.eval(-1), Truth::Unknown);
        assert_eq!(f.eval(10), Truth::Unknown);
    }

    #[test]
    fn and_or_of_nested_intervals() {
        let g = bfi("10_20:12_15");
        let h = bfi("10_20:13_14");
        assert_eq!(g.and(&h).to_string(), "10_20:13_14");
        assert_eq!(g.or(&h).to_string(), "10_20:12_15");
    }

    #[test]
    fn not_complements_within_domain() {
        let g = bfi("10_20:12_15");
        assert_eq!(g.not_().to_string(), "10_20:10_11,16_20");
    }

    #[test]
    fn not_of_empty_is_true_across_domain() {
        let g = bfi("0_9:");
        assert_eq!(g.not_().segments(), &[Seg { start: 0, end: 10 }]);
        assert!(g.not_().not_().is_empty());
    }

    #[test]
    fn double_negation_restores_within_domain() {
        for text in ["10_20:12_15", "0_99:5_10,20_30,40_50", "0_9:0_9"] {
            let g = bfi(text);
            assert_eq!(g.not_().not_(), g.or_());
        }
    }

    #[test]
    fn and_or_are_idempotent() {
        let g = bfi("0_99:5_10,20_30");
        assert_eq!(g.and(&g), g.or_());
        assert_eq!(g.or(&g), g.or_());
    }

    #[test]
    fn or_coalesces_and_edge_variant_does_not() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 20);
        g.insert(20, 30);
        assert_eq!(g.or_().segments(), &[Seg { start: 10, end: 30 }]);
        assert_eq!(
            g.or_edge_().segments(),
            &[Seg { start: 10, end: 20 }, Seg { start: 20, end: 30 }]
        );
    }

    #[test]
    fn xor_drops_overlap_keeps_rest() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 30);
        g.insert(20, 40);
        assert_eq!(
            g.xor_().segments(),
            &[Seg { start: 10, end: 20 }, Seg { start: 30, end: 40 }]
        );
    }

    #[test]
    fn nand_nor_compose_not() {
        let g = bfi("0_19:2_5");
        let h = bfi("0_19:4_9");
        assert_eq!(g.nand(&h), g.and(&h).not_());
        assert_eq!(g.nor(&h), g.or(&h).not_());
    }

    #[test]
    fn known_clips_to_domain() {
        let mut g = Bfi::new(10, 20);
        g.insert(5, 12);
        g.insert(14, 16);
        g.insert(18, 25);
        g.insert(30, 40);
        let k = g.known();
        assert_eq!(
            k.segments(),
            &[
                Seg { start: 10, end: 12 },
                Seg { start: 14, end: 16 },
                Seg { start: 18, end: 20 },
            ]
        );
    }

    #[test]
    fn until_partitions_the_domain() {
        let mut g = Bfi::new(0, 100);
        g.insert(20, 30);
        g.insert(50, 60);
        let u = g.until_();
        assert_eq!(
            u.segments(),
            &[
                Seg { start: 0, end: 20 },
                Seg { start: 20, end: 50 },
                Seg { start: 50, end: 100 },
            ]
        );

        let empty = Bfi::new(0, 10);
        assert_eq!(empty.until_().segments(), &[Seg { start: 0, end: 10 }]);
    }

    #[test]
    fn yield_truncates_only_on_overlap() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 40); // overlaps the next start
        g.insert(30, 35);
        g.insert(50, 60);
        let y = g.yield_();
        assert_eq!(
            y.segments(),
            &[
                Seg { start: 10, end: 30 },
                Seg { start: 30, end: 35 },
                Seg { start: 50, end: 60 },
            ]
        );
    }

    #[test]
    fn conflict_reports_overlapping_segments() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 20);
        g.insert(15, 25);
        g.insert(40, 50);
        let c = g.conflict_();
        assert_eq!(
            c.segments(),
            &[Seg { start: 10, end: 20 }, Seg { start: 15, end: 25 }]
        );
    }

    #[test]
    fn select_and_reject_partition_by_intersection() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 20);
        g.insert(30, 40);
        g.insert(60, 70);
        let mut h = Bfi::new(0, 100);
        h.insert(35, 65);
        let s = g.select(&h);
        assert_eq!(
            s.segments(),
            &[Seg { start: 30, end: 40 }, Seg { start: 60, end: 70 }]
        );
        let r = g.reject(&h);
        assert_eq!(r.segments(), &[Seg { start: 10, end: 20 }]);
    }

    #[test]
    fn union_keeps_duplicates_in_order() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 20);
        let mut h = Bfi::new(0, 100);
        h.insert(10, 20);
        h.insert(5, 8);
        let u = g.union(&h);
        assert_eq!(
            u.segments(),
            &[
                Seg { start: 5, end: 8 },
                Seg { start: 10, end: 20 },
                Seg { start: 10, end: 20 },
            ]
        );
    }

    #[test]
    fn until_truncates_at_next_start() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 50);
        let mut h = Bfi::new(0, 100);
        h.insert(30, 40);
        let u = g.until(&h);
        assert_eq!(u.segments(), &[Seg { start: 10, end: 30 }]);
    }

    #[test]
    fn yield_keeps_segment_short_of_truncation() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 20); // ends before h starts: kept whole
        g.insert(25, 50); // overlaps h start: truncated
        let mut h = Bfi::new(0, 100);
        h.insert(30, 40);
        let y = g.yield_at(&h);
        assert_eq!(
            y.segments(),
            &[Seg { start: 10, end: 20 }, Seg { start: 25, end: 30 }]
        );
    }

    #[test]
    fn index_picks_by_position() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 20);
        g.insert(30, 40);
        g.insert(50, 60);
        let one = g.index(&SegIndex::parse("2").expect("index"));
        assert_eq!(one.segments(), &[Seg { start: 30, end: 40 }]);
        let last = g.index(&SegIndex::parse("-1").expect("index"));
        assert_eq!(last.segments(), &[Seg { start: 50, end: 60 }]);
        let range = g.index(&SegIndex::parse("1..2").expect("index"));
        assert_eq!(
            range.segments(),
            &[Seg { start: 10, end: 20 }, Seg { start: 30, end: 40 }]
        );
        let span = g.index(&SegIndex::parse("1_3").expect("index"));
        assert_eq!(span.segments(), &[Seg { start: 10, end: 60 }]);
    }

    #[test]
    fn indexed_select_applies_the_index_per_window() {
        let mut g = Bfi::new(0, 100);
        g.insert(10, 15);
        g.insert(20, 25);
        g.insert(40, 45);
        g.insert(60, 65);
        let mut h = Bfi::new(0, 100);
        h.insert(5, 30); // window holding the first two segments
        h.insert(35, 70); // window holding the last two
        let first_of_each = g.indexed_select(&h, &SegIndex::parse("1").expect("index"));
        assert_eq!(
            first_of_each.segments(),
            &[Seg { start: 10, end: 15 }, Seg { start: 40, end: 45 }]
        );
    }

    #[test]
    fn next_change_walks_boundaries() {
        let f = bfi("0_99:10_19,30_39");
        assert_eq!(f.next_change(0), Some((10, true)));
        assert_eq!(f.next_change(10), Some((20, false)));
        assert_eq!(f.next_change(25), Some((30, true)));
        assert_eq!(f.next_change(39), Some((40, false)));
        assert_eq!(f.next_change(40), None);
    }
}
