use std::time::Instant;

/// Frame counters for the monitor.
#[derive(Debug, Clone)]
pub struct Stats {
    pub ok: u64,
    pub bad: u64,
    pub estops: u64,
    pub bytes: u64,
    t0: Instant,
    last: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            ok: 0,
            bad: 0,
            estops: 0,
            bytes: 0,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }
    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
    }
    pub fn inc_ok(&mut self) {
        self.ok += 1;
    }
    pub fn inc_bad(&mut self) {
        self.bad += 1;
    }
    pub fn inc_estop(&mut self) {
        self.estops += 1;
    }

    pub fn summary(&self) -> String {
        let dur = self.t0.elapsed().as_secs_f64().max(1e-3);
        format!(
            "ok={} bad={} estop={} bytes={} over {:.1}s ({:.1} B/s)",
            self.ok,
            self.bad,
            self.estops,
            self.bytes,
            dur,
            self.bytes as f64 / dur
        )
    }

    /// Log a summary every `interval` seconds; byte rate restarts each time.
    pub fn maybe_print(&mut self, interval: f64) {
        if self.last.elapsed().as_secs_f64() >= interval {
            tracing::info!("[monitor] {}", self.summary());
            self.last = Instant::now();
            self.t0 = Instant::now();
            self.bytes = 0;
        }
    }
}
