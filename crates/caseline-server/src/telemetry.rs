// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const METRIC_SUBSYSTEM: &str = "caseline";

#[derive(Default)]
pub struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    sqlite_latency_ns: Mutex<HashMap<String, Vec<u64>>>,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_default()
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn observe_sqlite_query(&self, query_class: &str, latency: Duration) {
        let mut map = self.sqlite_latency_ns.lock().await;
        map.entry(query_class.to_string())
            .or_default()
            .push(latency.as_nanos() as u64);
    }

    /// Prometheus text exposition. Counters carry route and status labels;
    /// latencies are reported as p50/p95/p99 gauges computed on scrape.
    pub(crate) async fn render(&self, ready: bool, status_counts: &[(&str, u64)]) -> String {
        let mut body = String::with_capacity(4096);
        body.push_str(&format!(
            "caseline_ready{{subsystem=\"{METRIC_SUBSYSTEM}\"}} {}\n",
            u8::from(ready)
        ));
        for (status, count) in status_counts {
            body.push_str(&format!(
                "caseline_requests_by_status{{subsystem=\"{METRIC_SUBSYSTEM}\",case_status=\"{status}\"}} {count}\n"
            ));
        }

        let mut counts: Vec<((String, u16), u64)> = self
            .counts
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        for ((route, status), count) in counts {
            body.push_str(&format!(
                "http_requests_total{{subsystem=\"{METRIC_SUBSYSTEM}\",route=\"{route}\",status=\"{status}\"}} {count}\n"
            ));
        }

        let latencies = self.latency_ns.lock().await.clone();
        let mut routes: Vec<&String> = latencies.keys().collect();
        routes.sort();
        for route in routes {
            let vals = &latencies[route];
            for (q, label) in [(0.5, "p50"), (0.95, "p95"), (0.99, "p99")] {
                body.push_str(&format!(
                    "caseline_http_request_latency_{label}_seconds{{subsystem=\"{METRIC_SUBSYSTEM}\",route=\"{route}\"}} {:.6}\n",
                    percentile_ns(vals, q) as f64 / 1_000_000_000.0
                ));
            }
        }

        let sqlite = self.sqlite_latency_ns.lock().await.clone();
        let mut classes: Vec<&String> = sqlite.keys().collect();
        classes.sort();
        for class in classes {
            body.push_str(&format!(
                "caseline_sqlite_query_latency_p95_seconds{{subsystem=\"{METRIC_SUBSYSTEM}\",query_class=\"{class}\"}} {:.6}\n",
                percentile_ns(&sqlite[class], 0.95) as f64 / 1_000_000_000.0
            ));
        }
        body
    }
}

pub(crate) fn percentile_ns(samples: &[u64], quantile: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let idx = ((sorted.len() as f64) * quantile).ceil() as usize;
    sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_handles_edges() {
        assert_eq!(percentile_ns(&[], 0.95), 0);
        assert_eq!(percentile_ns(&[7], 0.5), 7);
        let v: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile_ns(&v, 0.95), 95);
        assert_eq!(percentile_ns(&v, 0.99), 99);
    }

    #[tokio::test]
    async fn render_includes_observed_routes() {
        let metrics = RequestMetrics::default();
        metrics
            .observe_request("/healthz", StatusCode::OK, Duration::from_millis(1))
            .await;
        metrics
            .observe_sqlite_query("cheap", Duration::from_millis(2))
            .await;
        metrics
            .observe_sqlite_query("write", Duration::from_millis(3))
            .await;
        let body = metrics.render(true, &[("received", 3)]).await;
        assert!(body.contains("caseline_ready{subsystem=\"caseline\"} 1"));
        assert!(body.contains("route=\"/healthz\",status=\"200\"} 1"));
        assert!(body.contains("case_status=\"received\"} 3"));
        assert!(body.contains("query_class=\"cheap\""));
        assert!(body.contains("query_class=\"write\""));
    }
}
