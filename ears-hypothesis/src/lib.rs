//! LocalAgreement-N stabilization: turn a stream of successive full-window
//! transcriptions into a stable, strictly-monotone confirmed prefix.
//!
//! A word is confirmed only once it appears, in the same position and with
//! the same case-folded text, across `agreement_n` consecutive hypotheses.
//! Once confirmed its text never changes; its timestamps are taken from the
//! *oldest* agreeing hypothesis, the most conservative interval available.

use std::collections::VecDeque;

/// Default tolerance, in seconds, for matching a new hypothesis's leading
/// words against the tail of what's already confirmed. Word-timestamp
/// estimators disagree by small amounts at window boundaries. Empirically
/// chosen; callers needing a different value pass it to
/// [`HypothesisBuffer::with_config`].
pub const DEFAULT_OVERLAP_TOLERANCE_SECONDS: f64 = 0.1;

/// How many of the most recently confirmed words to check a boundary word
/// against before deciding it's a duplicate rather than new content.
const DEDUPE_LOOKBACK: usize = 5;

/// Default cap on the `confirmed` log; oldest entries are dropped once
/// exceeded (display/prompt history only — does not affect correctness).
const DEFAULT_CONFIRMED_CAP: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
}

impl TimestampedWord {
    pub fn new(text: impl Into<String>, start: f64, end: f64, confidence: f32) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence,
        }
    }

    /// Return a copy shifted so its timestamps become absolute.
    pub fn shift(&self, offset_seconds: f64) -> Self {
        Self {
            start: self.start + offset_seconds,
            end: self.end + offset_seconds,
            ..self.clone()
        }
    }

    fn normalized(&self) -> String {
        self.text.trim().to_lowercase()
    }
}

pub struct HypothesisBuffer {
    agreement_n: usize,
    overlap_tolerance_seconds: f64,
    confirmed: VecDeque<TimestampedWord>,
    confirmed_cap: usize,
    confirmed_in_buffer: VecDeque<TimestampedWord>,
    previous_hypotheses: VecDeque<Vec<TimestampedWord>>,
    current_hypothesis: Vec<TimestampedWord>,
    /// Set by `insert`, cleared by `flush`. Guards against a second `flush`
    /// with no intervening `insert` re-running agreement over an unchanged
    /// hypothesis and re-confirming its own leftover tail against itself.
    dirty: bool,
}

impl HypothesisBuffer {
    pub fn new(agreement_n: usize) -> Self {
        Self::with_config(agreement_n, DEFAULT_OVERLAP_TOLERANCE_SECONDS, DEFAULT_CONFIRMED_CAP)
    }

    pub fn with_confirmed_cap(agreement_n: usize, confirmed_cap: usize) -> Self {
        Self::with_config(agreement_n, DEFAULT_OVERLAP_TOLERANCE_SECONDS, confirmed_cap)
    }

    pub fn with_config(agreement_n: usize, overlap_tolerance_seconds: f64, confirmed_cap: usize) -> Self {
        assert!(agreement_n >= 1, "agreement_n must be at least 1");
        Self {
            agreement_n,
            overlap_tolerance_seconds,
            confirmed: VecDeque::new(),
            confirmed_cap,
            confirmed_in_buffer: VecDeque::new(),
            previous_hypotheses: VecDeque::new(),
            current_hypothesis: Vec::new(),
            dirty: false,
        }
    }

    /// Shift `words` to absolute time, drop the leading words that overlap
    /// what's already confirmed, and store the result as the current
    /// hypothesis.
    pub fn insert(&mut self, words: &[TimestampedWord], offset_seconds: f64) {
        let shifted: Vec<TimestampedWord> = words.iter().map(|w| w.shift(offset_seconds)).collect();
        self.current_hypothesis = self.dedupe_overlap(shifted);
        self.dirty = true;
    }

    fn dedupe_overlap(&self, words: Vec<TimestampedWord>) -> Vec<TimestampedWord> {
        let Some(last_confirmed_end) = self.confirmed_in_buffer.back().map(|w| w.end) else {
            return words;
        };
        let mut start_idx = 0;
        while start_idx < words.len() && words[start_idx].start < last_confirmed_end - self.overlap_tolerance_seconds {
            start_idx += 1;
        }
        if start_idx > 0 {
            let boundary = &words[start_idx - 1];
            let straddles_the_live_window = boundary.end > last_confirmed_end;
            let recent: Vec<String> = self
                .confirmed_in_buffer
                .iter()
                .rev()
                .take(DEDUPE_LOOKBACK)
                .map(|w| w.normalized())
                .collect();
            if straddles_the_live_window && !recent.contains(&boundary.normalized()) {
                start_idx -= 1;
            }
        }
        words[start_idx..].to_vec()
    }

    /// Push a copy of the current hypothesis into the agreement ring, run
    /// LocalAgreement, and return any newly confirmed words. `current_hypothesis`
    /// itself keeps whatever doesn't get confirmed, so it still reflects the
    /// tentative tail afterwards.
    ///
    /// A no-op, returning empty, if called again with no intervening `insert`.
    pub fn flush(&mut self) -> Vec<TimestampedWord> {
        if !self.dirty {
            return Vec::new();
        }
        self.dirty = false;

        self.previous_hypotheses.push_back(self.current_hypothesis.clone());
        while self.previous_hypotheses.len() > self.agreement_n {
            self.previous_hypotheses.pop_front();
        }
        if self.previous_hypotheses.len() < self.agreement_n {
            return Vec::new();
        }

        let min_len = self.previous_hypotheses.iter().map(Vec::len).min().unwrap_or(0);
        let mut agreed = 0;
        'scan: for i in 0..min_len {
            let first = self.previous_hypotheses[0][i].normalized();
            for hypothesis in self.previous_hypotheses.iter().skip(1) {
                if hypothesis[i].normalized() != first {
                    break 'scan;
                }
            }
            agreed += 1;
        }
        if agreed == 0 {
            return Vec::new();
        }

        let newly_confirmed: Vec<TimestampedWord> = self.previous_hypotheses[0][..agreed].to_vec();
        for hypothesis in self.previous_hypotheses.iter_mut() {
            hypothesis.drain(0..agreed);
        }
        self.current_hypothesis.drain(0..agreed);
        self.promote(&newly_confirmed);
        newly_confirmed
    }

    fn promote(&mut self, words: &[TimestampedWord]) {
        for word in words {
            self.confirmed.push_back(word.clone());
            self.confirmed_in_buffer.push_back(word.clone());
        }
        while self.confirmed.len() > self.confirmed_cap {
            self.confirmed.pop_front();
        }
    }

    /// Force-confirm whatever remains in `current_hypothesis`, verbatim, in
    /// the order it was inserted. Used only at finalization; ordinary
    /// operation never calls this, so disagreement always blocks promotion.
    pub fn force_confirm_all(&mut self) -> Vec<TimestampedWord> {
        let remaining = std::mem::take(&mut self.current_hypothesis);
        self.previous_hypotheses.clear();
        self.dirty = false;
        if remaining.is_empty() {
            return remaining;
        }
        self.promote(&remaining);
        remaining
    }

    /// Drop confirmed words whose `end` no longer lies within the audio
    /// window, keeping `confirmed_in_buffer` in sync after the audio buffer
    /// trims. `confirmed` itself is untouched.
    pub fn trim_to_time(&mut self, absolute_time: f64) {
        while let Some(front) = self.confirmed_in_buffer.front() {
            if front.end < absolute_time {
                self.confirmed_in_buffer.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn get_confirmed_text(&self) -> String {
        self.confirmed.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
    }

    pub fn get_tentative_text(&self) -> String {
        self.current_hypothesis
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A continuity prompt for the transcriber: the in-window confirmed
    /// text, truncated to `max_chars` from the tail at a word boundary.
    pub fn get_prompt_suffix(&self, max_chars: usize) -> String {
        let full: String = self
            .confirmed_in_buffer
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if full.len() <= max_chars {
            return full;
        }
        let tail_start = full.len() - max_chars;
        match full[tail_start..].find(' ') {
            Some(space_idx) => full[tail_start + space_idx + 1..].to_string(),
            None => full[tail_start..].to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.confirmed_in_buffer.clear();
        self.previous_hypotheses.clear();
        self.current_hypothesis.clear();
        self.dirty = false;
    }

    pub fn confirmed_word_count(&self) -> usize {
        self.confirmed.len()
    }

    pub fn tentative_word_count(&self) -> usize {
        self.current_hypothesis.len()
    }
}
