/// Running counters for one loopback session.
///
/// `packets_lost` is derived from the sent/received totals on every
/// `recompute_loss` call rather than accumulated, so it is an estimate:
/// a late echo and a dropped one look the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub mismatch_count: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn record_sent(&mut self, n: usize) {
        self.packets_sent += 1;
        self.bytes_sent += n as u64;
    }
    pub fn record_received(&mut self, n: usize) {
        self.packets_received += 1;
        self.bytes_received += n as u64;
    }
    pub fn record_mismatch(&mut self) {
        self.mismatch_count += 1;
    }
    pub fn recompute_loss(&mut self) {
        self.packets_lost = self.packets_sent.saturating_sub(self.packets_received);
    }

    /// Signed on purpose: in duplex mode stray echoes can push received
    /// above sent, which yields a negative rate while `packets_lost` stays 0.
    pub fn loss_rate_percent(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        let sent = self.packets_sent as f64;
        let recv = self.packets_received as f64;
        (sent - recv) / sent * 100.0
    }

    /// Fraction of a bounded run completed, clamped to 1.0.
    pub fn progress(&self, target: Option<u64>) -> Option<f64> {
        match target {
            None => None,
            Some(0) => Some(1.0),
            Some(t) => Some((self.packets_sent as f64 / t as f64).min(1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_tracks_difference() {
        let mut s = Stats::new();
        for (sent, recv) in [(0u64, 0u64), (3, 1), (5, 5), (2, 7), (10, 0)] {
            s.packets_sent = sent;
            s.packets_received = recv;
            s.recompute_loss();
            assert_eq!(s.packets_lost, sent.saturating_sub(recv));
        }
    }

    #[test]
    fn balanced_counts_mean_no_loss() {
        let mut s = Stats::new();
        for _ in 0..4 {
            s.record_sent(13);
            s.record_received(13);
            s.recompute_loss();
        }
        assert_eq!(s.packets_lost, 0);
        assert_eq!(s.bytes_sent, 52);
        assert_eq!(s.bytes_received, 52);
    }

    #[test]
    fn loss_rate_zero_without_sends() {
        let mut s = Stats::new();
        assert_eq!(s.loss_rate_percent(), 0.0);
        s.record_received(10);
        s.record_received(10);
        assert_eq!(s.loss_rate_percent(), 0.0);
    }

    #[test]
    fn loss_rate_formula() {
        let mut s = Stats::new();
        for _ in 0..4 {
            s.record_sent(1);
        }
        s.record_received(1);
        assert!((s.loss_rate_percent() - 75.0).abs() < 1e-9);

        s.record_received(1);
        s.record_received(1);
        s.record_received(1);
        s.record_received(1);
        s.recompute_loss();
        assert_eq!(s.packets_lost, 0);
        assert!((s.loss_rate_percent() + 25.0).abs() < 1e-9);
    }

    #[test]
    fn mismatch_leaves_traffic_counters_alone() {
        let mut s = Stats::new();
        s.record_mismatch();
        assert_eq!(s.mismatch_count, 1);
        assert_eq!(s.packets_sent, 0);
        assert_eq!(s.packets_received, 0);
    }

    #[test]
    fn progress_is_clamped() {
        let mut s = Stats::new();
        assert_eq!(s.progress(None), None);
        s.record_sent(1);
        assert_eq!(s.progress(Some(4)), Some(0.25));
        for _ in 0..10 {
            s.record_sent(1);
        }
        assert_eq!(s.progress(Some(4)), Some(1.0));
    }
}
