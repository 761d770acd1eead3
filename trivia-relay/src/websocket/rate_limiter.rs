use std::time::{Duration, Instant};

/// Token bucket: `max_tokens` burst, one token back every `refill_rate`
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: u32,
    max_tokens: u32,
    refill_rate: Duration,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::new_with_limits(60, Duration::from_millis(250))
    }

    pub fn new_with_limits(max_tokens: u32, refill_rate: Duration) -> Self {
        Self {
            tokens: max_tokens, // Start with full bucket
            max_tokens,
            refill_rate: refill_rate.max(Duration::from_millis(1)),
            last_refill: Instant::now(),
        }
    }

    pub fn check_rate_limit(&mut self) -> bool {
        self.refill_tokens();

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill_tokens(&mut self) {
        let now = Instant::now();
        let time_passed = now.duration_since(self.last_refill);

        if time_passed >= self.refill_rate {
            let tokens_to_add = (time_passed.as_millis() / self.refill_rate.as_millis()) as u32;
            self.tokens = self.tokens.saturating_add(tokens_to_add).min(self.max_tokens);
            // Keep the remainder so slow trickles still earn tokens
            self.last_refill += self.refill_rate * tokens_to_add;
        }
    }

    pub fn get_remaining_tokens(&mut self) -> u32 {
        self.refill_tokens();
        self.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
