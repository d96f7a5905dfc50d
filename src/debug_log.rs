use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone)]
struct DebugLine {
    at: DateTime<Utc>,
    message: String,
}

/// Ring of timestamped trace lines describing what the coordinator did since
/// the last flush. Oldest lines are dropped once `capacity` is reached.
#[derive(Debug)]
pub struct DebugLog {
    name: String,
    capacity: usize,
    lines: VecDeque<DebugLine>,
    dropped: usize,
    has_output: bool,
}

impl DebugLog {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            lines: VecDeque::with_capacity(capacity),
            dropped: 0,
            has_output: false,
        }
    }

    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::trace!(target = "debug_log", "{message}");
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(DebugLine {
            at: Utc::now(),
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn has_output(&self) -> bool {
        self.has_output
    }

    /// Allow the next unforced flush to emit again.
    pub fn rearm(&mut self) {
        self.has_output = false;
    }

    pub fn render(&self) -> String {
        let mut text = format!("START: {} Debug Log:\n", self.name);
        if self.dropped > 0 {
            text.push_str(&format!("({} earlier lines dropped)\n", self.dropped));
        }
        for line in &self.lines {
            text.push_str(&line.at.to_rfc3339_opts(SecondsFormat::Millis, true));
            text.push_str(": ");
            text.push_str(&line.message);
            text.push('\n');
        }
        text
    }

    /// Emit the buffered lines once per arming unless `force` is set, then
    /// clear the ring either way. Returns the emitted text.
    pub fn flush(&mut self, force: bool) -> Option<String> {
        let emitted = if !self.has_output || force {
            let text = self.render();
            tracing::debug!(target = "debug_log", "{text}");
            Some(text)
        } else {
            None
        };
        if !force {
            self.has_output = true;
        }
        self.lines.clear();
        self.dropped = 0;
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_emits_once_until_rearmed() {
        let mut log = DebugLog::new("Show Total Lesson Count", 8);
        log.record("first");
        let text = log.flush(false).expect("first flush emits");
        assert!(text.starts_with("START: Show Total Lesson Count Debug Log:\n"));
        assert!(text.contains(": first\n"));
        assert!(log.is_empty());

        log.record("second");
        assert!(log.flush(false).is_none());
        assert!(log.is_empty(), "suppressed flush still clears");

        log.rearm();
        log.record("third");
        assert!(log.flush(false).unwrap().contains("third"));
    }

    #[test]
    fn forced_flush_does_not_consume_arming() {
        let mut log = DebugLog::new("x", 4);
        log.record("a");
        assert!(log.flush(true).is_some());
        assert!(!log.has_output());
        log.record("b");
        assert!(log.flush(false).is_some());
    }

    #[test]
    fn ring_drops_oldest() {
        let mut log = DebugLog::new("x", 2);
        log.record("one");
        log.record("two");
        log.record("three");
        assert_eq!(log.len(), 2);
        let text = log.render();
        assert!(!text.contains("one"));
        assert!(text.contains("1 earlier lines dropped"));
        assert!(text.contains("three"));
    }
}
