//! Per-action request counter
//!
//! The Prometheus recorder is built but never installed as the global
//! `metrics` recorder. It is owned by whoever constructs it and counters are
//! recorded through [`metrics::with_local_recorder`], so two pipelines in one
//! process (or two tests) never share counts.
//!
//! Exposition format:
//!
//! ```text
//! # HELP wiki_pages_total The total number of processed events
//! # TYPE wiki_pages_total counter
//! wiki_pages_total{handler="view"} 3
//! wiki_pages_total{handler="save"} 2
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use metrics::{counter, describe_counter, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::routing::Action;

/// Counter incremented once per dispatched page request
pub const PAGES_TOTAL: &str = "wiki_pages_total";
const PAGES_TOTAL_HELP: &str = "The total number of processed events";

/// Sink for the per-action request counter
///
/// Implementations must be safe to call from any number of concurrent
/// requests without external locking.
pub trait RequestRecorder: Send + Sync + 'static {
    fn record_request(&self, action: Action);
}

/// Prometheus-backed request counter
pub struct PrometheusRequestMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusRequestMetrics {
    /// Build a recorder whose output carries `global_labels` on every series
    pub fn new(global_labels: &[(&str, &str)]) -> Self {
        let builder = global_labels
            .iter()
            .fold(PrometheusBuilder::new(), |builder, (key, value)| {
                builder.add_global_label(*key, *value)
            });

        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        with_local_recorder(&recorder, || {
            describe_counter!(PAGES_TOTAL, PAGES_TOTAL_HELP);
        });

        tracing::debug!(labels = global_labels.len(), "Prometheus request metrics created");

        Self { recorder, handle }
    }

    /// Current registry in the Prometheus text exposition format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl RequestRecorder for PrometheusRequestMetrics {
    fn record_request(&self, action: Action) {
        with_local_recorder(&self.recorder, || {
            counter!(PAGES_TOTAL, "handler" => action.as_str()).increment(1);
        });
    }
}

/// Request counter that only keeps totals in memory
///
/// Used when `/metrics` is disabled and as a test double.
#[derive(Debug, Default)]
pub struct InMemoryRequestCounter {
    counts: Mutex<HashMap<Action, u64>>,
}

impl InMemoryRequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, action: Action) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(&action).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<Action, u64> {
        self.counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

impl RequestRecorder for InMemoryRequestCounter {
    fn record_request(&self, action: Action) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(action).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_value(rendered: &str, action: Action) -> Option<u64> {
        let prefix = format!("{}{{handler=\"{}\"}} ", PAGES_TOTAL, action.as_str());
        rendered
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .and_then(|value| value.trim().parse().ok())
    }

    #[test]
    fn test_counts_are_partitioned_by_action() {
        let metrics = PrometheusRequestMetrics::new(&[]);

        for _ in 0..3 {
            metrics.record_request(Action::View);
        }
        for _ in 0..2 {
            metrics.record_request(Action::Save);
        }

        let rendered = metrics.render();
        assert_eq!(sample_value(&rendered, Action::View), Some(3));
        assert_eq!(sample_value(&rendered, Action::Save), Some(2));
        assert_eq!(sample_value(&rendered, Action::Edit), None);
    }

    #[test]
    fn test_render_includes_type_and_help() {
        let metrics = PrometheusRequestMetrics::new(&[]);
        metrics.record_request(Action::Edit);

        let rendered = metrics.render();
        assert!(rendered.contains("# TYPE wiki_pages_total counter"));
        assert!(rendered.contains("# HELP wiki_pages_total The total number of processed events"));
    }

    #[test]
    fn test_recorders_do_not_share_state() {
        let first = PrometheusRequestMetrics::new(&[]);
        let second = PrometheusRequestMetrics::new(&[]);

        first.record_request(Action::View);

        assert_eq!(sample_value(&first.render(), Action::View), Some(1));
        assert_eq!(sample_value(&second.render(), Action::View), None);
    }

    #[test]
    fn test_global_labels_are_rendered() {
        let metrics = PrometheusRequestMetrics::new(&[("service", "gowiki")]);
        metrics.record_request(Action::View);

        let rendered = metrics.render();
        let line = rendered
            .lines()
            .find(|line| line.starts_with(PAGES_TOTAL) && line.contains("handler=\"view\""))
            .expect("view sample present");
        assert!(line.contains("service=\"gowiki\""));
        assert!(line.ends_with(" 1"));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let metrics = Arc::new(PrometheusRequestMetrics::new(&[]));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        metrics.record_request(Action::View);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(sample_value(&metrics.render(), Action::View), Some(200));
    }

    #[test]
    fn test_in_memory_counter() {
        let counter = InMemoryRequestCounter::new();
        counter.record_request(Action::View);
        counter.record_request(Action::View);
        counter.record_request(Action::Save);

        assert_eq!(counter.count(Action::View), 2);
        assert_eq!(counter.count(Action::Save), 1);
        assert_eq!(counter.count(Action::Edit), 0);
        assert_eq!(counter.snapshot().len(), 2);
    }
}
