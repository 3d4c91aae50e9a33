// Location: src/processing/batch.rs

use std::time::{Duration, Instant};

use crate::types::TokenBatch;

/// Tokens buffered before a flush is forced: a batch goes out once the buffer holds
/// more than this many.
pub const DEFAULT_BATCH_THRESHOLD: usize = 2;

/// Coalesces accepted tokens into [`TokenBatch`]es and measures throughput between flushes
#[derive(Debug)]
pub struct TokenBatcher {
    buffer: Vec<String>,
    threshold: usize,
    last_flush: Instant,
}

impl TokenBatcher {
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(threshold + 1),
            threshold: threshold.max(1),
            last_flush: Instant::now(),
        }
    }

    /// Buffer one token. Returns a batch when the buffer crosses the threshold.
    pub fn push(&mut self, token: &str, cumulative_token_count: u64) -> Option<TokenBatch> {
        self.buffer.push(token.to_owned());
        if self.buffer.len() <= self.threshold {
            return None;
        }

        let now = Instant::now();
        let speed = tokens_per_second(self.buffer.len(), now.duration_since(self.last_flush));
        self.last_flush = now;
        Some(self.take(cumulative_token_count, speed))
    }

    /// Flush the remainder, if any. No reliable interval exists here, so speed is 0.
    pub fn finish(&mut self, cumulative_token_count: u64) -> Option<TokenBatch> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.take(cumulative_token_count, 0.0))
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn take(&mut self, cumulative_token_count: u64, tokens_per_second: f64) -> TokenBatch {
        let text = self.buffer.concat();
        self.buffer.clear();
        TokenBatch {
            text,
            cumulative_token_count,
            tokens_per_second,
        }
    }
}

impl Default for TokenBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_THRESHOLD)
    }
}

fn tokens_per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flushes_on_third_token() {
        let mut batcher = TokenBatcher::default();
        assert!(batcher.push("a", 1).is_none());
        assert!(batcher.push("b", 2).is_none());

        let batch = batcher.push("c", 3).unwrap();
        assert_eq!(batch.text, "abc");
        assert_eq!(batch.cumulative_token_count, 3);
        assert!(batch.tokens_per_second >= 0.0);
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn test_finish_flushes_remainder_with_zero_speed() {
        let mut batcher = TokenBatcher::default();
        batcher.push("Hello", 1);
        batcher.push(" there", 2);

        let batch = batcher.finish(2).unwrap();
        assert_eq!(batch.text, "Hello there");
        assert_eq!(batch.cumulative_token_count, 2);
        assert_eq!(batch.tokens_per_second, 0.0);
        assert!(batcher.finish(2).is_none());
    }

    #[test]
    fn test_speed_uses_batch_size() {
        let mut batcher = TokenBatcher::new(2);
        batcher.push("a", 1);
        batcher.push("b", 2);
        std::thread::sleep(Duration::from_millis(20));
        let batch = batcher.push("c", 3).unwrap();
        // three tokens over at least 20ms
        assert!(batch.tokens_per_second > 0.0);
        assert!(batch.tokens_per_second <= 150.0);
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let mut batcher = TokenBatcher::new(0);
        assert_eq!(batcher.threshold(), 1);
        assert!(batcher.push("a", 1).is_none());
        assert_eq!(batcher.push("b", 2).unwrap().text, "ab");
    }

    #[test]
    fn test_zero_elapsed_is_zero_speed() {
        assert_eq!(tokens_per_second(3, Duration::ZERO), 0.0);
        assert_eq!(tokens_per_second(4, Duration::from_secs(2)), 2.0);
    }
}
