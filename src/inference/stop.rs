//! Incremental stop-sequence matching over streamed pieces.

/// Result of feeding one piece to a [`StopSequenceDetector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopScan {
    /// Text that can be emitted now. May be empty while a possible stop
    /// prefix is withheld.
    Continue(String),
    /// A stop sequence matched; this is the text before it. Nothing after it
    /// is ever emitted.
    Stopped(String),
}

/// Withholds any tail that could still grow into a stop sequence, so a stop
/// split across pieces never leaks into the output.
#[derive(Debug, Clone)]
pub struct StopSequenceDetector {
    stops: Vec<String>,
    pending: String,
    stopped: bool,
}

impl StopSequenceDetector {
    pub fn new<I, S>(stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stops: stops
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
            pending: String::new(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn push(&mut self, piece: &str) -> StopScan {
        if self.stopped {
            return StopScan::Stopped(String::new());
        }
        self.pending.push_str(piece);

        let earliest = self
            .stops
            .iter()
            .filter_map(|stop| self.pending.find(stop.as_str()))
            .min();
        if let Some(at) = earliest {
            self.stopped = true;
            let mut emitted = std::mem::take(&mut self.pending);
            emitted.truncate(at);
            return StopScan::Stopped(emitted);
        }

        let keep = self.partial_stop_len();
        let split = self.pending.len() - keep;
        let rest = self.pending.split_off(split);
        StopScan::Continue(std::mem::replace(&mut self.pending, rest))
    }

    /// Releases withheld text once generation ends without a stop.
    pub fn finish(&mut self) -> String {
        if self.stopped {
            return String::new();
        }
        std::mem::take(&mut self.pending)
    }

    /// Length of the longest suffix of `pending` that is a proper prefix of
    /// some stop sequence.
    fn partial_stop_len(&self) -> usize {
        let mut longest = 0;
        for stop in &self.stops {
            let max = stop.len().saturating_sub(1).min(self.pending.len());
            for len in (longest + 1..=max).rev() {
                let start = self.pending.len() - len;
                if self.pending.is_char_boundary(start)
                    && stop.is_char_boundary(len)
                    && stop.starts_with(&self.pending[start..])
                {
                    longest = len;
                    break;
                }
            }
        }
        longest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stops: &[&str], pieces: &[&str]) -> (String, bool) {
        let mut detector = StopSequenceDetector::new(stops.iter().copied());
        let mut out = String::new();
        for piece in pieces {
            match detector.push(piece) {
                StopScan::Continue(text) => out.push_str(&text),
                StopScan::Stopped(text) => {
                    out.push_str(&text);
                    return (out, true);
                }
            }
        }
        out.push_str(&detector.finish());
        (out, false)
    }

    #[test]
    fn test_stop_split_across_pieces() {
        let (out, stopped) = run(&["</digest>"], &["Tech news", " today</di", "gest> ignored"]);
        assert_eq!(out, "Tech news today");
        assert!(stopped);
    }

    #[test]
    fn test_false_prefix_released() {
        let (out, stopped) = run(&["</digest>"], &["a </d", "iv> b"]);
        assert_eq!(out, "a </div> b");
        assert!(!stopped);
    }

    #[test]
    fn test_withheld_tail_flushed_on_finish() {
        let mut detector = StopSequenceDetector::new(["\n\n\n"]);
        assert_eq!(detector.push("end\n\n"), StopScan::Continue("end".into()));
        assert_eq!(detector.finish(), "\n\n");
    }

    #[test]
    fn test_earliest_stop_wins() {
        let (out, _) = run(&["</digest>", "\n\n\n"], &["one\n\n\ntwo</digest>"]);
        assert_eq!(out, "one");
    }

    #[test]
    fn test_multibyte_text() {
        let (out, stopped) = run(&["ünd"], &["grü", "ße ü", "nd mehr"]);
        assert_eq!(out, "grüße ");
        assert!(stopped);
    }
}
