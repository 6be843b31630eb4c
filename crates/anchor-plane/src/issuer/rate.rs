//! Per-subject issuance rate limiting

use std::collections::HashMap;

/// Sliding-window limiter keyed by subject
#[derive(Debug)]
pub struct IssuanceLimiter {
    limit: u32,
    window_ms: i64,
    subjects: HashMap<String, Vec<i64>>,
}

impl IssuanceLimiter {
    #[must_use]
    pub fn new(limit: u32, window_ms: i64) -> Self {
        Self {
            limit,
            window_ms,
            subjects: HashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_secs(&self) -> u64 {
        u64::try_from(self.window_ms / 1000).unwrap_or(0)
    }

    /// Record an issuance at `now_ms` if the subject is under its limit
    #[must_use]
    pub fn try_acquire(&mut self, subject: &str, now_ms: i64) -> bool {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        let stamps = self.subjects.entry(subject.to_string()).or_default();
        stamps.retain(|t| *t > cutoff);

        if stamps.len() < self.limit as usize {
            stamps.push(now_ms);
            true
        } else {
            false
        }
    }

    /// Give back a slot taken at `at_ms` by an issuance that failed
    pub fn release(&mut self, subject: &str, at_ms: i64) {
        if let Some(stamps) = self.subjects.get_mut(subject) {
            if let Some(pos) = stamps.iter().rposition(|t| *t == at_ms) {
                stamps.remove(pos);
            }
        }
    }

    /// Forget subjects with no issuances inside the window
    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        self.subjects.retain(|_, stamps| {
            stamps.retain(|t| *t > cutoff);
            !stamps.is_empty()
        });
    }

    pub fn tracked_subjects(&self) -> usize {
        self.subjects.len()
    }
}
