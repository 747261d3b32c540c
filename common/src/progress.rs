/// Observer for human-readable status lines emitted while sampling and
/// detecting. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, status: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, status: &str) {
        self(status)
    }
}

/// Percentage of `total` units finished after `done` units, rounded down.
pub fn percent(done: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    done.min(total) * 100 / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn percent_rounds_down_and_caps() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(5, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |s: &str| seen.lock().unwrap().push(s.to_string());
        sink.report("Extracted frames: 50%");
        assert_eq!(seen.lock().unwrap().as_slice(), ["Extracted frames: 50%"]);
    }
}
