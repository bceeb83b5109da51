use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for one preview sampling session.
///
/// All counters are relaxed atomics so worker threads can record without
/// coordination.
#[derive(Debug, Default)]
pub struct PreviewMetrics {
    // Sampling
    pub total_samples_written: AtomicUsize,
    pub total_sampling_time_us: AtomicU64,
    pub max_chunk_time_us: AtomicU64,
    pub total_chunks_sampled: AtomicUsize,
    pub total_sections_created: AtomicUsize,
    pub total_structures_found: AtomicUsize,

    // Point queries
    pub total_query_hits: AtomicUsize,
    pub total_query_misses: AtomicUsize,

    // Persistence
    pub total_save_time_us: AtomicU64,
    pub total_load_time_us: AtomicU64,
    pub total_bytes_on_disk: AtomicUsize,

    // Session
    pub start_time: Option<Instant>,
    pub config_summary: String,
}

impl PreviewMetrics {
    pub fn new(config_summary: String) -> Self {
        Self {
            start_time: Some(Instant::now()),
            config_summary,
            ..Default::default()
        }
    }

    pub fn record_chunk(&self, duration: Duration, samples: usize) {
        self.total_chunks_sampled.fetch_add(1, Ordering::Relaxed);
        self.total_samples_written.fetch_add(samples, Ordering::Relaxed);
        let us = duration.as_micros() as u64;
        self.total_sampling_time_us.fetch_add(us, Ordering::Relaxed);
        self.max_chunk_time_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn record_section_created(&self) {
        self.total_sections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_structure(&self) {
        self.total_structures_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_hit(&self) {
        self.total_query_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_miss(&self) {
        self.total_query_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self, duration: Duration, bytes: usize) {
        self.total_save_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_bytes_on_disk.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_load(&self, duration: Duration) {
        self.total_load_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let uptime = self.start_time.unwrap_or_else(Instant::now).elapsed();
        let chunks = self.total_chunks_sampled.load(Ordering::Relaxed);
        let samples = self.total_samples_written.load(Ordering::Relaxed);
        let sampling_total = self.total_sampling_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let chunk_max = self.max_chunk_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let chunk_avg = if chunks > 0 { sampling_total / chunks as f64 } else { 0.0 };
        let samples_per_sec = if uptime.as_secs_f64() > 0.0 {
            samples as f64 / uptime.as_secs_f64()
        } else {
            0.0
        };

        let sections = self.total_sections_created.load(Ordering::Relaxed);
        let structures = self.total_structures_found.load(Ordering::Relaxed);

        let hits = self.total_query_hits.load(Ordering::Relaxed);
        let misses = self.total_query_misses.load(Ordering::Relaxed);
        let queries = hits + misses;
        let hit_rate = if queries > 0 {
            (hits as f64 / queries as f64) * 100.0
        } else {
            0.0
        };

        let save_time = self.total_save_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let load_time = self.total_load_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let disk_kb = self.total_bytes_on_disk.load(Ordering::Relaxed) as f64 / 1024.0;

        format!(
            "Preview Session Report\n\
             ======================\n\
             Configuration: {}\n\
             Session Duration: {:.2?}\n\n\
             [Sampling]\n\
             Chunks Sampled: {}\n\
             Samples Written: {}\n\
             Throughput: {:.0} samples/s\n\
             Avg Time: {:.2} ms/chunk\n\
             Max Time: {:.2} ms/chunk\n\n\
             [Storage]\n\
             Sections Created: {}\n\
             Structure Starts: {}\n\n\
             [Point Queries]\n\
             Hits: {}\n\
             Misses: {}\n\
             Hit Rate: {:.1}%\n\n\
             [Persistence]\n\
             Save Time: {:.2} ms\n\
             Load Time: {:.2} ms\n\
             On Disk: {:.1} KB\n",
            self.config_summary,
            uptime,
            chunks, samples, samples_per_sec, chunk_avg, chunk_max,
            sections, structures,
            hits, misses, hit_rate,
            save_time, load_time, disk_kb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_contains_recorded_counts() {
        let metrics = PreviewMetrics::new("stride=4 compression=on".to_string());
        metrics.record_chunk(Duration::from_millis(3), 16);
        metrics.record_chunk(Duration::from_millis(1), 16);
        metrics.record_section_created();
        metrics.record_query_hit();
        metrics.record_query_miss();
        metrics.record_save(Duration::from_millis(5), 2048);

        let report = metrics.generate_report();
        assert!(report.contains("stride=4 compression=on"));
        assert!(report.contains("Chunks Sampled: 2"));
        assert!(report.contains("Samples Written: 32"));
        assert!(report.contains("Hit Rate: 50.0%"));
        assert!(report.contains("On Disk: 2.0 KB"));
    }

    #[test]
    fn test_max_chunk_time_keeps_maximum() {
        let metrics = PreviewMetrics::new(String::new());
        metrics.record_chunk(Duration::from_micros(500), 1);
        metrics.record_chunk(Duration::from_micros(100), 1);
        assert_eq!(metrics.max_chunk_time_us.load(Ordering::Relaxed), 500);
    }
}
