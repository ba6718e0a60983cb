//! Process-wide counters: an ambient metrics surface alongside tracing.
//! Exposed as Prometheus text exposition format at `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    missions_started: AtomicU64,
    missions_done: AtomicU64,
    missions_failed: AtomicU64,
    probes_dispatched: AtomicU64,
    gate_pass: AtomicU64,
    gate_fail: AtomicU64,
    speedup_milli_sum: AtomicU64,
    speedup_samples: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mission_started(&self) {
        self.missions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mission_done(&self) {
        self.missions_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mission_failed(&self) {
        self.missions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probes_dispatched(&self, n: u64) {
        self.probes_dispatched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn gate_verdict(&self, passed: bool) {
        if passed {
            self.gate_pass.fetch_add(1, Ordering::Relaxed);
        } else {
            self.gate_fail.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn speedup_sample(&self, speedup: f64) {
        self.speedup_milli_sum.fetch_add((speedup * 1000.0) as u64, Ordering::Relaxed);
        self.speedup_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn mean_speedup(&self) -> f64 {
        let samples = self.speedup_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 1.0;
        }
        (self.speedup_milli_sum.load(Ordering::Relaxed) as f64 / 1000.0) / samples as f64
    }

    /// Render as Prometheus text exposition format, one gauge per line —
    /// the same `name value` shape a Prometheus text exporter emits.
    pub fn render(&self) -> String {
        format!(
            "sql_optimizer_missions_started {}\n\
             sql_optimizer_missions_done {}\n\
             sql_optimizer_missions_failed {}\n\
             sql_optimizer_probes_dispatched {}\n\
             sql_optimizer_gate_pass {}\n\
             sql_optimizer_gate_fail {}\n\
             sql_optimizer_mean_speedup {:.4}\n",
            self.missions_started.load(Ordering::Relaxed),
            self.missions_done.load(Ordering::Relaxed),
            self.missions_failed.load(Ordering::Relaxed),
            self.probes_dispatched.load(Ordering::Relaxed),
            self.gate_pass.load(Ordering::Relaxed),
            self.gate_fail.load(Ordering::Relaxed),
            self.mean_speedup(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_zeroed_counters() {
        let m = Metrics::new();
        let text = m.render();
        assert!(text.contains("sql_optimizer_missions_started 0"));
        assert!(text.contains("sql_optimizer_mean_speedup 1.0000"));
    }

    #[test]
    fn tracks_mean_speedup() {
        let m = Metrics::new();
        m.speedup_sample(2.0);
        m.speedup_sample(4.0);
        assert!((m.mean_speedup() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn counts_gate_verdicts() {
        let m = Metrics::new();
        m.gate_verdict(true);
        m.gate_verdict(false);
        m.gate_verdict(true);
        let text = m.render();
        assert!(text.contains("sql_optimizer_gate_pass 2"));
        assert!(text.contains("sql_optimizer_gate_fail 1"));
    }
}
