use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;

/// Which collaborator a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Cloak,
    Verify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetric {
    pub operation: Operation,
    pub start_time: i64, // milliseconds since epoch
    pub latency_ms: u64,
    pub success: bool,
    pub failure_kind: Option<ErrorKind>,
    /// Response arrived after a reset or new upload and was dropped
    pub discarded: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub discarded_calls: usize,
    pub failure_rate: f64,

    // Latency statistics (milliseconds)
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,

    pub calls_by_operation: HashMap<Operation, usize>,
    pub failures_by_kind: HashMap<ErrorKind, usize>,
}

/// Latency and outcome of every collaborator call made by one session.
#[derive(Debug)]
pub struct ServiceMetrics {
    session_name: String,
    start_time: Instant,
    calls: Vec<CallMetric>,
}

impl ServiceMetrics {
    pub fn new(session_name: String) -> Self {
        Self {
            session_name,
            start_time: Instant::now(),
            calls: Vec::new(),
        }
    }

    pub fn record_call(
        &mut self,
        operation: Operation,
        latency: Duration,
        failure_kind: Option<ErrorKind>,
        discarded: bool,
    ) {
        let start_time = chrono::Utc::now().timestamp_millis() - latency.as_millis() as i64;

        self.calls.push(CallMetric {
            operation,
            start_time,
            latency_ms: latency.as_millis() as u64,
            success: failure_kind.is_none(),
            failure_kind,
            discarded,
        });
    }

    pub fn calls(&self) -> &[CallMetric] {
        &self.calls
    }

    pub fn aggregate(&self) -> AggregatedStats {
        let mut stats = AggregatedStats::default();

        if self.calls.is_empty() {
            return stats;
        }

        stats.total_calls = self.calls.len();
        stats.discarded_calls = self.calls.iter().filter(|c| c.discarded).count();

        // Outcome tallies only cover responses the session applied
        let applied: Vec<&CallMetric> = self.calls.iter().filter(|c| !c.discarded).collect();
        stats.successful_calls = applied.iter().filter(|c| c.success).count();
        stats.failed_calls = applied.len() - stats.successful_calls;
        if !applied.is_empty() {
            stats.failure_rate = (stats.failed_calls as f64 / applied.len() as f64) * 100.0;
        }

        let mut successful_latencies: Vec<u64> = applied
            .iter()
            .filter(|c| c.success)
            .map(|c| c.latency_ms)
            .collect();
        successful_latencies.sort_unstable();

        if let (Some(&min), Some(&max)) =
            (successful_latencies.first(), successful_latencies.last())
        {
            stats.latency_min_ms = min;
            stats.latency_max_ms = max;
            stats.latency_avg_ms = successful_latencies.iter().sum::<u64>() as f64
                / successful_latencies.len() as f64;

            stats.latency_p50_ms = percentile(&successful_latencies, 50.0);
            stats.latency_p95_ms = percentile(&successful_latencies, 95.0);
            stats.latency_p99_ms = percentile(&successful_latencies, 99.0);
        }

        for call in &self.calls {
            *stats.calls_by_operation.entry(call.operation).or_insert(0) += 1;
        }

        for kind in applied.iter().filter_map(|c| c.failure_kind) {
            *stats.failures_by_kind.entry(kind).or_insert(0) += 1;
        }

        stats
    }

    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let stats = self.aggregate();

        let output = serde_json::json!({
            "session_name": self.session_name,
            "session_duration_secs": self.start_time.elapsed().as_secs(),
            "aggregated_stats": stats,
            "calls": self.calls,
        });

        let json_string = serde_json::to_string_pretty(&output)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;

        Ok(())
    }
}

fn percentile(sorted_data: &[u64], percentile: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }

    // Nearest-rank
    let rank = (percentile / 100.0 * sorted_data.len() as f64).ceil() as usize;
    sorted_data[rank.saturating_sub(1).min(sorted_data.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(percentile(&data, 50.0), 5);
        assert_eq!(percentile(&data, 90.0), 9);
        assert_eq!(percentile(&data, 95.0), 10);
        assert_eq!(percentile(&data, 99.0), 10);
        assert_eq!(percentile(&data, 0.0), 1);
        assert_eq!(percentile(&[7], 50.0), 7);
        assert_eq!(percentile(&[], 50.0), 0);
    }

    #[test]
    fn test_metrics_aggregation() {
        let mut metrics = ServiceMetrics::new("TestSession".to_string());

        metrics.record_call(Operation::Cloak, Duration::from_millis(100), None, false);
        metrics.record_call(Operation::Verify, Duration::from_millis(200), None, true);
        metrics.record_call(
            Operation::Cloak,
            Duration::from_millis(150),
            Some(ErrorKind::Transport),
            false,
        );

        let stats = metrics.aggregate();

        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.successful_calls, 1);
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(stats.discarded_calls, 1);
        assert_eq!(stats.failure_rate, 50.0);
        assert_eq!(stats.latency_min_ms, 100);
        assert_eq!(stats.latency_max_ms, 100);
        assert_eq!(stats.calls_by_operation.get(&Operation::Cloak), Some(&2));
        assert_eq!(stats.calls_by_operation.get(&Operation::Verify), Some(&1));
        assert_eq!(stats.failures_by_kind.get(&ErrorKind::Transport), Some(&1));
    }

    #[test]
    fn test_discarded_failures_not_tallied() {
        let mut metrics = ServiceMetrics::new("TestSession".to_string());

        metrics.record_call(
            Operation::Verify,
            Duration::from_millis(80),
            Some(ErrorKind::Rejected),
            true,
        );
        metrics.record_call(Operation::Cloak, Duration::from_millis(90), None, true);

        let stats = metrics.aggregate();

        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.discarded_calls, 2);
        assert_eq!(stats.successful_calls, 0);
        assert_eq!(stats.failed_calls, 0);
        assert_eq!(stats.failure_rate, 0.0);
        assert!(stats.failures_by_kind.is_empty());
        assert_eq!(stats.latency_max_ms, 0);
        assert_eq!(stats.calls_by_operation.get(&Operation::Verify), Some(&1));
    }

    #[test]
    fn test_export_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let mut metrics = ServiceMetrics::new("TestSession".to_string());
        metrics.record_call(Operation::Verify, Duration::from_millis(42), None, false);
        metrics.export_to_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["session_name"], "TestSession");
        assert_eq!(json["aggregated_stats"]["total_calls"], 1);
    }
}
