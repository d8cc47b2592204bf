use std::time::Duration;

/// Global maximum span delay for a retry.
const GLOBAL_MAX: Duration = Duration::from_secs(120);

/// An exponential backoff.
pub struct Exponential {
    initial: Duration,
    attempt: u32,
}

impl Exponential {
    /// Construct a new exponential backoff.
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            attempt: 0,
        }
    }

    /// Get the next duration and increment the attempt counter.
    ///
    /// The first call returns the initial duration, every following call
    /// doubles it until the global maximum is reached.
    pub fn next(&mut self) -> Duration {
        let duration = match self.initial.checked_mul(1u32 << self.attempt.min(16)) {
            Some(duration) => duration.min(GLOBAL_MAX),
            None => GLOBAL_MAX,
        };

        self.attempt = self.attempt.saturating_add(1);
        duration
    }

    /// Reset the backoff after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::Exponential;
    use std::time::Duration;

    #[test]
    fn test_doubles_until_capped() {
        let mut backoff = Exponential::new(Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(4));
        assert_eq!(backoff.next(), Duration::from_secs(8));

        for _ in 0..10 {
            backoff.next();
        }

        assert_eq!(backoff.next(), Duration::from_secs(120));
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_secs(2));
    }
}
