//! Tests for throughput sampling and phase progress tracking

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tilemosaic::io::progress::{PhaseProgress, Throughput};

    // Tests rates, percent and ETA halfway through a phase
    // Verified by computing the ETA from done instead of remaining items
    #[test]
    fn test_sample_halfway() {
        let rates = Throughput::sample(50, 100, 20 * 1024 * 1024, Duration::from_secs(10));

        assert!((rates.per_second - 5.0).abs() < f64::EPSILON);
        assert_eq!(rates.percent, 50);
        assert_eq!(rates.eta, Some(Duration::from_secs(10)));
        assert_eq!(rates.megabytes, 20);
        assert_eq!(rates.megabytes_per_second, 2);
    }

    // Tests an empty phase reports complete and unknown ETA before any work
    // Verified by dividing by total without the zero guard
    #[test]
    fn test_sample_edge_cases() {
        let empty = Throughput::sample(0, 0, 0, Duration::from_secs(1));
        assert_eq!(empty.percent, 100);

        let fresh = Throughput::sample(0, 10, 0, Duration::ZERO);
        assert_eq!(fresh.percent, 0);
        assert_eq!(fresh.eta, None);
    }

    // Tests percent never exceeds 100 when more items finish than planned
    // Verified by removing the min clamp
    #[test]
    fn test_sample_clamps_percent() {
        let rates = Throughput::sample(15, 10, 0, Duration::from_secs(1));
        assert_eq!(rates.percent, 100);
    }

    // Tests hidden progress records totals and only evaluates detail when reporting
    // Verified by evaluating detail on every update
    #[test]
    fn test_phase_progress_hidden() {
        let mut progress = PhaseProgress::new("index", 4, false);
        assert_eq!(progress.total(), 4);

        let mut evaluated = false;
        progress.update(1, 1, 0, || {
            evaluated = true;
            String::new()
        });
        assert!(!evaluated, "detail must wait for the report interval");

        progress.finish();
    }
}
