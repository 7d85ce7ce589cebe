//! Simulated typing.
//!
//! Buffered reply content is revealed a few characters at a time with a
//! randomised pause between chunks, and a longer pause after sentence
//! punctuation. The buffer keeps one segment per correlation id run so
//! content is never relabelled, and new content always lands behind what is
//! already buffered.

use std::collections::VecDeque;
use std::time::Duration;

use parley_core::CorrelationId;

use crate::config::PacingConfig;

/// Characters followed by the longer pause.
pub const SENTENCE_PUNCTUATION: &[char] = &['.', '!', '?', ',', ';', ':'];

/// Source of pacing randomness.
pub trait Jitter: Send {
    /// A value in `lo..=hi`.
    fn between(&mut self, lo: u64, hi: u64) -> u64;
}

/// Jitter backed by the operating system's RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsJitter;

impl Jitter for OsJitter {
    fn between(&mut self, lo: u64, hi: u64) -> u64 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let span = hi - lo;
        if span == 0 {
            return lo;
        }
        match getrandom::u64() {
            Ok(n) => lo + n % (span.saturating_add(1)).max(1),
            Err(e) => {
                tracing::debug!(error = %e, "RNG unavailable, using midpoint");
                lo + span / 2
            }
        }
    }
}

/// Content waiting to be revealed for one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentBuffer {
    /// Not yet revealed text.
    pub content: String,
    /// Reply the text belongs to.
    pub correlation_id: Option<CorrelationId>,
}

/// Next piece to reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacedChunk {
    /// Text to apply.
    pub text: String,
    /// Reply the text belongs to.
    pub correlation_id: Option<CorrelationId>,
    /// Pause before applying it.
    pub delay: Duration,
}

/// FIFO of buffered segments.
#[derive(Debug, Clone, Default)]
pub struct PacingQueue {
    segments: VecDeque<FragmentBuffer>,
}

impl PacingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append content behind everything already buffered.
    pub fn push(&mut self, content: &str, correlation_id: Option<CorrelationId>) {
        if content.is_empty() {
            return;
        }
        if let Some(tail) = self.segments.back_mut() {
            if tail.correlation_id == correlation_id {
                tail.content.push_str(content);
                return;
            }
        }
        self.segments.push_back(FragmentBuffer {
            content: content.to_string(),
            correlation_id,
        });
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Buffered characters across all segments.
    #[must_use]
    pub fn buffered_chars(&self) -> usize {
        self.segments.iter().map(|s| s.content.chars().count()).sum()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Plan the next chunk without consuming it.
    ///
    /// `last_char` is the most recently rendered character of the timeline.
    pub fn next_chunk(
        &self,
        last_char: Option<char>,
        config: &PacingConfig,
        jitter: &mut dyn Jitter,
    ) -> Option<PacedChunk> {
        let front = self.segments.front()?;

        let min = config.min_chunk.max(1) as u64;
        let max = config.max_chunk.max(config.min_chunk).max(1) as u64;
        let want = usize::try_from(jitter.between(min, max)).unwrap_or(usize::MAX);

        let end = front
            .content
            .char_indices()
            .nth(want)
            .map_or(front.content.len(), |(i, _)| i);
        let text = front.content[..end].to_string();

        let mut delay_ms = jitter.between(config.min_delay_ms, config.max_delay_ms);
        if last_char.is_some_and(|c| SENTENCE_PUNCTUATION.contains(&c)) {
            delay_ms += jitter.between(config.punctuation_min_ms, config.punctuation_max_ms);
        }

        Some(PacedChunk {
            text,
            correlation_id: front.correlation_id.clone(),
            delay: Duration::from_millis(delay_ms),
        })
    }

    /// Remove an applied chunk from the front.
    ///
    /// Returns false, leaving the queue untouched, if the front no longer
    /// starts with the chunk.
    pub fn consume(&mut self, chunk: &PacedChunk) -> bool {
        let Some(front) = self.segments.front_mut() else {
            return false;
        };
        if front.correlation_id != chunk.correlation_id || !front.content.starts_with(&chunk.text) {
            return false;
        }
        front.content.drain(..chunk.text.len());
        if front.content.is_empty() {
            self.segments.pop_front();
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Always answers with the same position inside the range.
    pub(crate) struct FixedJitter(pub(crate) Pick);

    #[derive(Clone, Copy)]
    pub(crate) enum Pick {
        Low,
        High,
    }

    impl Jitter for FixedJitter {
        fn between(&mut self, lo: u64, hi: u64) -> u64 {
            match self.0 {
                Pick::Low => lo,
                Pick::High => hi,
            }
        }
    }

    fn id(s: &str) -> Option<CorrelationId> {
        Some(CorrelationId::new(s))
    }

    #[test]
    fn chunks_are_between_one_and_four_chars() {
        let mut queue = PacingQueue::new();
        queue.push("Hello world", id("t1"));
        let config = PacingConfig::default();

        let low = queue
            .next_chunk(None, &config, &mut FixedJitter(Pick::Low))
            .unwrap();
        assert_eq!(low.text, "H");
        assert_eq!(low.delay, Duration::from_millis(20));

        let high = queue
            .next_chunk(None, &config, &mut FixedJitter(Pick::High))
            .unwrap();
        assert_eq!(high.text, "Hell");
        assert_eq!(high.delay, Duration::from_millis(100));
    }

    #[test]
    fn punctuation_adds_pause() {
        let mut queue = PacingQueue::new();
        queue.push("Next", id("t1"));
        let config = PacingConfig::default();

        for c in SENTENCE_PUNCTUATION {
            let chunk = queue
                .next_chunk(Some(*c), &config, &mut FixedJitter(Pick::Low))
                .unwrap();
            assert_eq!(chunk.delay, Duration::from_millis(20 + 150));
        }

        let chunk = queue
            .next_chunk(Some('.'), &config, &mut FixedJitter(Pick::High))
            .unwrap();
        assert_eq!(chunk.delay, Duration::from_millis(100 + 300));

        let chunk = queue
            .next_chunk(Some('a'), &config, &mut FixedJitter(Pick::High))
            .unwrap();
        assert_eq!(chunk.delay, Duration::from_millis(100));
    }

    #[test]
    fn chunks_respect_char_boundaries() {
        let mut queue = PacingQueue::new();
        queue.push("héllo wörld", id("t1"));
        let config = PacingConfig::default();

        let chunk = queue
            .next_chunk(None, &config, &mut FixedJitter(Pick::High))
            .unwrap();
        assert_eq!(chunk.text, "héll");
        assert!(queue.consume(&chunk));
        assert_eq!(queue.buffered_chars(), 7);
    }

    #[test]
    fn consume_drains_in_order() {
        let mut queue = PacingQueue::new();
        queue.push("abcdef", id("t1"));
        let config = PacingConfig::default();
        let mut jitter = FixedJitter(Pick::High);

        let mut revealed = String::new();
        while let Some(chunk) = queue.next_chunk(None, &config, &mut jitter) {
            revealed.push_str(&chunk.text);
            assert!(queue.consume(&chunk));
        }
        assert_eq!(revealed, "abcdef");
        assert!(queue.is_empty());
    }

    #[test]
    fn new_content_lands_behind_buffered_content() {
        let mut queue = PacingQueue::new();
        queue.push("ab", id("t1"));
        let config = PacingConfig::default();

        let chunk = queue
            .next_chunk(None, &config, &mut FixedJitter(Pick::Low))
            .unwrap();
        queue.push("cd", id("t1"));
        assert!(queue.consume(&chunk));

        let rest = queue
            .next_chunk(None, &config, &mut FixedJitter(Pick::High))
            .unwrap();
        assert_eq!(rest.text, "bcd");
    }

    #[test]
    fn different_ids_keep_separate_segments() {
        let mut queue = PacingQueue::new();
        queue.push("one", id("t1"));
        queue.push("two", id("t2"));
        queue.push("more", id("t2"));
        let config = PacingConfig {
            max_chunk: 10,
            ..PacingConfig::default()
        };
        let mut jitter = FixedJitter(Pick::High);

        let first = queue.next_chunk(None, &config, &mut jitter).unwrap();
        assert_eq!((first.text.as_str(), first.correlation_id.clone()), ("one", id("t1")));
        assert!(queue.consume(&first));

        let second = queue.next_chunk(None, &config, &mut jitter).unwrap();
        assert_eq!((second.text.as_str(), second.correlation_id.clone()), ("twomore", id("t2")));
    }

    #[test]
    fn consume_rejects_stale_chunk() {
        let mut queue = PacingQueue::new();
        queue.push("abc", id("t1"));
        let chunk = queue
            .next_chunk(None, &PacingConfig::default(), &mut FixedJitter(Pick::Low))
            .unwrap();

        queue.clear();
        queue.push("xyz", id("t1"));
        assert!(!queue.consume(&chunk));
        assert_eq!(queue.buffered_chars(), 3);
    }

    #[test]
    fn os_jitter_stays_in_range() {
        let mut jitter = OsJitter;
        for _ in 0..200 {
            let n = jitter.between(20, 100);
            assert!((20..=100).contains(&n));
        }
        assert_eq!(jitter.between(7, 7), 7);
        assert!((1..=4).contains(&jitter.between(4, 1)));
    }
}
