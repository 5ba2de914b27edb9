use std::time::Duration;

/// Delays to wait before each reconnect attempt.
///
/// Attempt `n` waits `delays[n]`; once the list is used up the client gives
/// up and reports `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl ReconnectPolicy {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    pub fn next_delay(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }
}

/// Retry immediately, then after 2, 10 and 30 seconds.
impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new([0, 2, 10, 30].map(Duration::from_secs))
    }
}
