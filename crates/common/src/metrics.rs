use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::MessageId;

/// One completed send/arrival pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundTrip {
    pub message_id: MessageId,
    pub latency_ms: u64,
    /// Mean over every sample recorded so far, not just the retained ones.
    pub average_ms: u64,
    pub sample_count: u64,
}

/// Pairs inbound messages with outstanding sends in FIFO order.
///
/// Replies carry no label, so the oldest pending send is always the one
/// credited with the next arrival. Latencies are rounded to whole
/// milliseconds per sample before they enter the running mean. Only the
/// newest `history_capacity` samples are retained; the running sum and count
/// cover the whole session.
#[derive(Debug)]
pub struct TimingAggregator {
    pending: VecDeque<(MessageId, Instant)>,
    history: VecDeque<RoundTrip>,
    history_capacity: usize,
    total_ms: u64,
    sample_count: u64,
}

impl TimingAggregator {
    pub fn new(history_capacity: usize) -> Self {
        let history_capacity = history_capacity.max(1);
        Self {
            pending: VecDeque::new(),
            history: VecDeque::with_capacity(history_capacity.min(4096)),
            history_capacity,
            total_ms: 0,
            sample_count: 0,
        }
    }

    pub fn record_send(&mut self, id: MessageId, sent_at: Instant) {
        self.pending.push_back((id, sent_at));
    }

    pub fn record_arrival(&mut self, arrived_at: Instant) -> Option<RoundTrip> {
        let (message_id, sent_at) = self.pending.pop_front()?;

        let elapsed = arrived_at.saturating_duration_since(sent_at);
        let latency_ms = (elapsed.as_nanos() as f64 / 1_000_000.0).round() as u64;

        self.total_ms += latency_ms;
        self.sample_count += 1;
        let average_ms = (self.total_ms as f64 / self.sample_count as f64).round() as u64;

        let sample = RoundTrip {
            message_id,
            latency_ms,
            average_ms,
            sample_count: self.sample_count,
        };

        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        Some(sample)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn average_ms(&self) -> Option<u64> {
        self.history.back().map(|last| last.average_ms)
    }

    pub fn last(&self) -> Option<RoundTrip> {
        self.history.back().copied()
    }

    pub fn samples(&self) -> impl Iterator<Item = &RoundTrip> {
        self.history.iter()
    }

    /// Forgets outstanding sends; recorded samples are kept.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingSnapshot {
    pub pending: usize,
    pub sample_count: u64,
    pub last: Option<RoundTrip>,
}

/// Thread-safe handle to a [`TimingAggregator`].
/// Cloning is cheap; all clones share the same tables.
#[derive(Debug, Clone)]
pub struct TimingRecorder {
    inner: Arc<Mutex<TimingAggregator>>,
}

impl TimingRecorder {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimingAggregator::new(history_capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimingAggregator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_send(&self, id: MessageId, sent_at: Instant) {
        self.lock().record_send(id, sent_at);
    }

    pub fn record_arrival(&self, arrived_at: Instant) -> Option<RoundTrip> {
        self.lock().record_arrival(arrived_at)
    }

    pub fn clear_pending(&self) {
        self.lock().clear_pending();
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        let timing = self.lock();
        TimingSnapshot {
            pending: timing.pending_len(),
            sample_count: timing.sample_count(),
            last: timing.last(),
        }
    }

    pub fn get_results(&self) -> Vec<RoundTrip> {
        self.lock().samples().copied().collect()
    }

    pub fn save_to_csv(&self, path: impl AsRef<Path>) -> Result<usize, csv::Error> {
        let results = self.get_results();
        let mut wtr = csv::Writer::from_path(path.as_ref())?;
        for record in &results {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        tracing::info!(
            records = results.len(),
            path = %path.as_ref().display(),
            "saved round-trip samples"
        );
        Ok(results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(base: Instant, micros: u64) -> Instant {
        base + Duration::from_micros(micros)
    }

    #[test]
    fn arrival_without_pending_send_is_ignored() {
        let mut timing = TimingAggregator::new(8);
        assert_eq!(timing.record_arrival(Instant::now()), None);
        assert_eq!(timing.sample_count(), 0);
        assert_eq!(timing.average_ms(), None);
    }

    #[test]
    fn arrivals_pair_with_oldest_send() {
        let base = Instant::now();
        let mut timing = TimingAggregator::new(8);
        timing.record_send(7, at(base, 0));
        timing.record_send(3, at(base, 10_000));

        let first = timing.record_arrival(at(base, 30_000)).unwrap();
        assert_eq!(first.message_id, 7);
        assert_eq!(first.latency_ms, 30);

        let second = timing.record_arrival(at(base, 30_000)).unwrap();
        assert_eq!(second.message_id, 3);
        assert_eq!(second.latency_ms, 20);
        assert_eq!(second.average_ms, 25);
        assert_eq!(second.sample_count, 2);
        assert_eq!(timing.pending_len(), 0);
    }

    #[test]
    fn average_uses_per_sample_rounding() {
        let base = Instant::now();
        let mut timing = TimingAggregator::new(8);
        // Raw latencies 1.4, 1.4, 1.7 ms: the raw mean rounds to 2,
        // but the rounded samples 1, 1, 2 average to 1.
        for id in 0..3 {
            timing.record_send(id, base);
        }
        timing.record_arrival(at(base, 1_400));
        timing.record_arrival(at(base, 1_400));
        let last = timing.record_arrival(at(base, 1_700)).unwrap();

        assert_eq!(last.latency_ms, 2);
        assert_eq!(last.average_ms, 1);
    }

    #[test]
    fn many_round_trips_match_reference_mean() {
        let base = Instant::now();
        let mut timing = TimingAggregator::new(1024);
        let latencies_us: Vec<u64> = (0..50).map(|i| 20_000 + i * 1_337).collect();

        for (id, _) in latencies_us.iter().enumerate() {
            timing.record_send(id as MessageId, base);
        }
        let mut last = None;
        for latency in &latencies_us {
            last = timing.record_arrival(at(base, *latency));
        }

        let rounded: Vec<u64> = latencies_us
            .iter()
            .map(|us| (*us as f64 / 1000.0).round() as u64)
            .collect();
        let expected = (rounded.iter().sum::<u64>() as f64 / rounded.len() as f64).round() as u64;

        let last = last.unwrap();
        assert_eq!(last.sample_count, 50);
        assert_eq!(last.average_ms, expected);
    }

    #[test]
    fn history_is_bounded_but_average_is_not() {
        let base = Instant::now();
        let mut timing = TimingAggregator::new(2);
        for (id, latency_ms) in [(0, 10), (1, 20), (2, 90)] {
            timing.record_send(id, base);
            timing.record_arrival(at(base, latency_ms * 1000));
        }

        let kept: Vec<u64> = timing.samples().map(|s| s.latency_ms).collect();
        assert_eq!(kept, vec![20, 90]);
        assert_eq!(timing.average_ms(), Some(40));
        assert_eq!(timing.sample_count(), 3);
    }

    #[test]
    fn clearing_pending_keeps_history() {
        let base = Instant::now();
        let mut timing = TimingAggregator::new(4);
        timing.record_send(0, base);
        timing.record_arrival(at(base, 5_000));
        timing.record_send(1, base);

        timing.clear_pending();
        assert_eq!(timing.pending_len(), 0);
        assert_eq!(timing.sample_count(), 1);
        assert_eq!(timing.record_arrival(at(base, 9_000)), None);
    }

    #[test]
    fn recorder_exports_csv() {
        let base = Instant::now();
        let recorder = TimingRecorder::new(4);
        recorder.record_send(0, base);
        recorder.record_arrival(at(base, 12_000));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round_trips.csv");
        assert_eq!(recorder.save_to_csv(&path).unwrap(), 1);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("message_id,latency_ms,average_ms,sample_count"));
        assert!(written.contains("0,12,12,1"));
    }
}
