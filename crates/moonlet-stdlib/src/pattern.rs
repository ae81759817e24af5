//! Lua pattern matching over byte strings.
//!
//! A backtracking matcher for the Lua pattern language: single-character
//! classes (`%a`, `[set]`, `.`), the quantifiers `* + - ?`, anchors, captures
//! (including position captures `()` and back-references `%1`), balanced
//! matches `%bxy` and frontiers `%f[set]`.

use thiserror::Error;

pub const MAX_CAPTURES: usize = 32;
const MAX_RECURSION: usize = 200;
const ESC: u8 = b'%';
const SPECIALS: &[u8] = b"^$*+?.([%-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("malformed pattern (ends with '%')")]
    EndsWithEscape,
    #[error("malformed pattern (missing ']')")]
    MissingBracket,
    #[error("malformed pattern (missing arguments to '%b')")]
    MissingBalanceArgs,
    #[error("missing '[' after '%f' in pattern")]
    FrontierWithoutSet,
    #[error("invalid capture index %{0}")]
    InvalidCaptureIndex(usize),
    #[error("invalid pattern capture")]
    InvalidCapture,
    #[error("unfinished capture")]
    UnfinishedCapture,
    #[error("too many captures")]
    TooManyCaptures,
    #[error("pattern too complex")]
    TooComplex,
}

/// A captured value: a byte range of the subject, or a position (`()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    Span(usize, usize),
    Position(usize),
}

/// A successful match: the whole-match range and the explicit captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

impl Match {
    /// Values a match produces for `string.match`/`gmatch`: the captures, or
    /// the whole match when the pattern has none.
    pub fn values(&self) -> Vec<Capture> {
        if self.captures.is_empty() {
            vec![Capture::Span(self.start, self.end)]
        } else {
            self.captures.clone()
        }
    }

    /// Capture `%i` of a replacement string (`%0` is the whole match).
    pub fn capture(&self, i: usize) -> Result<Capture, PatternError> {
        match i {
            0 => Ok(Capture::Span(self.start, self.end)),
            1 if self.captures.is_empty() => Ok(Capture::Span(self.start, self.end)),
            _ => self
                .captures
                .get(i - 1)
                .copied()
                .ok_or(PatternError::InvalidCaptureIndex(i)),
        }
    }
}

/// True when `pat` has no magic characters and can be searched literally.
pub fn is_plain(pat: &[u8]) -> bool {
    !pat.iter().any(|c| SPECIALS.contains(c))
}

/// Byte offset of the first occurrence of `needle` at or after `from`.
pub fn find_plain(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

#[derive(Debug, Clone, Copy)]
enum CapLen {
    Open,
    Position,
    Closed(usize),
}

#[derive(Debug, Clone, Copy)]
struct CapState {
    start: usize,
    len: CapLen,
}

pub struct Matcher<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    caps: Vec<CapState>,
    depth: usize,
}

impl<'a> Matcher<'a> {
    pub fn new(src: &'a [u8], pat: &'a [u8]) -> Self {
        Matcher {
            src,
            pat,
            caps: Vec::new(),
            depth: 0,
        }
    }

    /// Whether the pattern starts with `^`, and the offset where matching
    /// begins in the pattern.
    pub fn anchor(&self) -> (bool, usize) {
        let anchored = self.pat.first() == Some(&b'^');
        (anchored, anchored as usize)
    }

    /// Try to match the pattern (from pattern offset `p`) at subject offset `s`.
    pub fn match_at(&mut self, s: usize, p: usize) -> Result<Option<Match>, PatternError> {
        self.caps.clear();
        self.depth = 0;
        match self.do_match(s, p)? {
            Some(end) => self.build(s, end).map(Some),
            None => Ok(None),
        }
    }

    /// First match at or after `init`, honoring a leading `^`.
    pub fn find(&mut self, init: usize) -> Result<Option<Match>, PatternError> {
        let (anchored, p) = self.anchor();
        let mut s = init;
        loop {
            if let Some(m) = self.match_at(s, p)? {
                return Ok(Some(m));
            }
            s += 1;
            if anchored || s > self.src.len() {
                return Ok(None);
            }
        }
    }

    fn build(&self, start: usize, end: usize) -> Result<Match, PatternError> {
        let captures = self
            .caps
            .iter()
            .map(|c| match c.len {
                CapLen::Open => Err(PatternError::UnfinishedCapture),
                CapLen::Position => Ok(Capture::Position(c.start)),
                CapLen::Closed(e) => Ok(Capture::Span(c.start, e)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Match {
            start,
            end,
            captures,
        })
    }

    fn do_match(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        self.depth += 1;
        if self.depth > MAX_RECURSION {
            return Err(PatternError::TooComplex);
        }
        let result = self.match_here(s, p);
        self.depth -= 1;
        result
    }

    fn match_here(&mut self, mut s: usize, mut p: usize) -> Result<Option<usize>, PatternError> {
        let pat = self.pat;
        loop {
            if p == pat.len() {
                return Ok(Some(s));
            }
            match pat[p] {
                b'(' => {
                    return if pat.get(p + 1) == Some(&b')') {
                        self.start_capture(s, p + 2, CapLen::Position)
                    } else {
                        self.start_capture(s, p + 1, CapLen::Open)
                    };
                }
                b')' => return self.end_capture(s, p + 1),
                b'$' if p + 1 == pat.len() => {
                    return Ok((s == self.src.len()).then_some(s));
                }
                ESC => match pat.get(p + 1) {
                    Some(b'b') => match self.match_balance(s, p + 2)? {
                        Some(next) => {
                            s = next;
                            p += 4;
                            continue;
                        }
                        None => return Ok(None),
                    },
                    Some(b'f') => {
                        p += 2;
                        if pat.get(p) != Some(&b'[') {
                            return Err(PatternError::FrontierWithoutSet);
                        }
                        let ep = self.class_end(p)?;
                        let prev = if s == 0 { 0 } else { self.src[s - 1] };
                        let cur = self.src.get(s).copied().unwrap_or(0);
                        if !self.match_bracket(prev, p, ep - 1) && self.match_bracket(cur, p, ep - 1) {
                            p = ep;
                            continue;
                        }
                        return Ok(None);
                    }
                    Some(d) if d.is_ascii_digit() => match self.match_back_reference(s, *d)? {
                        Some(next) => {
                            s = next;
                            p += 2;
                            continue;
                        }
                        None => return Ok(None),
                    },
                    _ => {}
                },
                _ => {}
            }

            let ep = self.class_end(p)?;
            let matched = s < self.src.len() && self.single_match(self.src[s], p, ep);
            match pat.get(ep) {
                Some(b'?') => {
                    if matched {
                        if let Some(end) = self.do_match(s + 1, ep + 1)? {
                            return Ok(Some(end));
                        }
                    }
                    p = ep + 1;
                }
                Some(b'+') => {
                    return if matched { self.max_expand(s + 1, p, ep) } else { Ok(None) };
                }
                Some(b'*') => return self.max_expand(s, p, ep),
                Some(b'-') => return self.min_expand(s, p, ep),
                _ => {
                    if !matched {
                        return Ok(None);
                    }
                    s += 1;
                    p = ep;
                }
            }
        }
    }

    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, PatternError> {
        let mut count = 0;
        while s + count < self.src.len() && self.single_match(self.src[s + count], p, ep) {
            count += 1;
        }
        loop {
            if let Some(end) = self.do_match(s + count, ep + 1)? {
                return Ok(Some(end));
            }
            if count == 0 {
                return Ok(None);
            }
            count -= 1;
        }
    }

    fn min_expand(&mut self, mut s: usize, p: usize, ep: usize) -> Result<Option<usize>, PatternError> {
        loop {
            if let Some(end) = self.do_match(s, ep + 1)? {
                return Ok(Some(end));
            }
            if s < self.src.len() && self.single_match(self.src[s], p, ep) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn start_capture(&mut self, s: usize, p: usize, len: CapLen) -> Result<Option<usize>, PatternError> {
        if self.caps.len() >= MAX_CAPTURES {
            return Err(PatternError::TooManyCaptures);
        }
        self.caps.push(CapState { start: s, len });
        let result = self.do_match(s, p)?;
        if result.is_none() {
            self.caps.pop();
        }
        Ok(result)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        let open = self
            .caps
            .iter()
            .rposition(|c| matches!(c.len, CapLen::Open))
            .ok_or(PatternError::InvalidCapture)?;
        self.caps[open].len = CapLen::Closed(s);
        let result = self.do_match(s, p)?;
        if result.is_none() {
            self.caps[open].len = CapLen::Open;
        }
        Ok(result)
    }

    fn match_balance(&self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        if p + 1 >= self.pat.len() {
            return Err(PatternError::MissingBalanceArgs);
        }
        let (open, close) = (self.pat[p], self.pat[p + 1]);
        if self.src.get(s) != Some(&open) {
            return Ok(None);
        }
        let mut depth = 1;
        for (i, &c) in self.src.iter().enumerate().skip(s + 1) {
            if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(i + 1));
                }
            } else if c == open {
                depth += 1;
            }
        }
        Ok(None)
    }

    fn match_back_reference(&self, s: usize, digit: u8) -> Result<Option<usize>, PatternError> {
        let n = (digit - b'0') as usize;
        let cap = n
            .checked_sub(1)
            .and_then(|i| self.caps.get(i))
            .ok_or(PatternError::InvalidCaptureIndex(n))?;
        let captured = match cap.len {
            CapLen::Open => return Err(PatternError::InvalidCaptureIndex(n)),
            CapLen::Position => &self.src[cap.start..cap.start],
            CapLen::Closed(e) => &self.src[cap.start..e],
        };
        let rest = &self.src[s..];
        Ok(rest.starts_with(captured).then_some(s + captured.len()))
    }

    /// Offset just past the single-character class starting at `p`.
    fn class_end(&self, mut p: usize) -> Result<usize, PatternError> {
        let pat = self.pat;
        let c = pat[p];
        p += 1;
        match c {
            ESC => {
                if p >= pat.len() {
                    return Err(PatternError::EndsWithEscape);
                }
                Ok(p + 1)
            }
            b'[' => {
                if pat.get(p) == Some(&b'^') {
                    p += 1;
                }
                // The first character is always part of the set, so `[]]` works.
                loop {
                    if p >= pat.len() {
                        return Err(PatternError::MissingBracket);
                    }
                    let c = pat[p];
                    p += 1;
                    if c == ESC && p < pat.len() {
                        p += 1;
                    }
                    if pat.get(p) == Some(&b']') {
                        return Ok(p + 1);
                    }
                }
            }
            _ => Ok(p),
        }
    }

    fn single_match(&self, c: u8, p: usize, ep: usize) -> bool {
        match self.pat[p] {
            b'.' => true,
            ESC => match_class(c, self.pat[p + 1]),
            b'[' => self.match_bracket(c, p, ep - 1),
            literal => literal == c,
        }
    }

    /// `p` is the opening `[`, `end` the closing `]`.
    fn match_bracket(&self, c: u8, mut p: usize, end: usize) -> bool {
        let pat = self.pat;
        let mut positive = true;
        p += 1;
        if pat[p] == b'^' {
            positive = false;
            p += 1;
        }
        while p < end {
            if pat[p] == ESC {
                p += 1;
                if match_class(c, pat[p]) {
                    return positive;
                }
                p += 1;
            } else if pat[p + 1] == b'-' && p + 2 < end {
                if pat[p] <= c && c <= pat[p + 2] {
                    return positive;
                }
                p += 3;
            } else {
                if pat[p] == c {
                    return positive;
                }
                p += 1;
            }
        }
        !positive
    }
}

fn match_class(c: u8, class: u8) -> bool {
    let hit = match class.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => matches!(c, b' ' | b'\t'..=b'\r'),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        _ => return class == c,
    };
    if class.is_ascii_uppercase() {
        !hit
    } else {
        hit
    }
}
