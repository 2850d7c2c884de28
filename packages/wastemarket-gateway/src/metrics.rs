//! Prometheus metrics (lock-free atomics, zero allocation on hot path).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Reads ---
    pub loads_total: AtomicU64,
    pub loads_rpc: AtomicU64,
    pub loads_wallet: AtomicU64,
    pub loads_sample: AtomicU64,
    pub loads_empty: AtomicU64,
    pub items_dropped: AtomicU64,

    // --- Latency (μs, updated via CAS) ---
    pub load_duration_us_sum: AtomicU64,
    pub load_duration_us_max: AtomicU64,

    // --- Uploads ---
    pub uploads_pinning: AtomicU64,
    pub uploads_paste: AtomicU64,
    pub uploads_local_blob: AtomicU64,
    pub upload_backend_errors: AtomicU64,

    // --- Writes ---
    pub mints_total: AtomicU64,
    pub mint_errors: AtomicU64,
    pub purchases_total: AtomicU64,
    pub purchase_errors: AtomicU64,

    // --- RPC ---
    pub rpc_failovers: AtomicU64,
    pub rpc_errors: AtomicU64,
    pub mirror_errors: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            loads_total: AtomicU64::new(0),
            loads_rpc: AtomicU64::new(0),
            loads_wallet: AtomicU64::new(0),
            loads_sample: AtomicU64::new(0),
            loads_empty: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
            load_duration_us_sum: AtomicU64::new(0),
            load_duration_us_max: AtomicU64::new(0),
            uploads_pinning: AtomicU64::new(0),
            uploads_paste: AtomicU64::new(0),
            uploads_local_blob: AtomicU64::new(0),
            upload_backend_errors: AtomicU64::new(0),
            mints_total: AtomicU64::new(0),
            mint_errors: AtomicU64::new(0),
            purchases_total: AtomicU64::new(0),
            purchase_errors: AtomicU64::new(0),
            rpc_failovers: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
            mirror_errors: AtomicU64::new(0),
        }
    }

    pub fn record_load_duration(&self, start: Instant) {
        let us = start.elapsed().as_micros() as u64;
        self.load_duration_us_sum.fetch_add(us, Ordering::Relaxed);
        let mut cur = self.load_duration_us_max.load(Ordering::Relaxed);
        while us > cur {
            match self.load_duration_us_max.compare_exchange_weak(
                cur,
                us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, circuit_open: bool) -> String {
        let loads_total = self.loads_total.load(Ordering::Relaxed);
        let loads_rpc = self.loads_rpc.load(Ordering::Relaxed);
        let loads_wallet = self.loads_wallet.load(Ordering::Relaxed);
        let loads_sample = self.loads_sample.load(Ordering::Relaxed);
        let loads_empty = self.loads_empty.load(Ordering::Relaxed);
        let items_dropped = self.items_dropped.load(Ordering::Relaxed);
        let load_dur_sum = self.load_duration_us_sum.load(Ordering::Relaxed);
        let load_dur_max = self.load_duration_us_max.swap(0, Ordering::Relaxed);
        let uploads_pinning = self.uploads_pinning.load(Ordering::Relaxed);
        let uploads_paste = self.uploads_paste.load(Ordering::Relaxed);
        let uploads_local = self.uploads_local_blob.load(Ordering::Relaxed);
        let upload_errors = self.upload_backend_errors.load(Ordering::Relaxed);
        let mints = self.mints_total.load(Ordering::Relaxed);
        let mint_errors = self.mint_errors.load(Ordering::Relaxed);
        let purchases = self.purchases_total.load(Ordering::Relaxed);
        let purchase_errors = self.purchase_errors.load(Ordering::Relaxed);
        let rpc_failovers = self.rpc_failovers.load(Ordering::Relaxed);
        let rpc_errors = self.rpc_errors.load(Ordering::Relaxed);
        let mirror_errors = self.mirror_errors.load(Ordering::Relaxed);
        let circuit_open = circuit_open as u8;

        let load_dur_sum_s = load_dur_sum as f64 / 1_000_000.0;
        let load_dur_max_s = load_dur_max as f64 / 1_000_000.0;

        format!(
            "\
# HELP wastemarket_loads_total Listing loads requested.\n\
# TYPE wastemarket_loads_total counter\n\
wastemarket_loads_total {loads_total}\n\
# HELP wastemarket_loads_by_source_total Listing loads by the source that answered.\n\
# TYPE wastemarket_loads_by_source_total counter\n\
wastemarket_loads_by_source_total{{source=\"rpc\"}} {loads_rpc}\n\
wastemarket_loads_by_source_total{{source=\"wallet\"}} {loads_wallet}\n\
wastemarket_loads_by_source_total{{source=\"sample\"}} {loads_sample}\n\
wastemarket_loads_by_source_total{{source=\"empty\"}} {loads_empty}\n\
# HELP wastemarket_items_dropped_total Records dropped because metadata could not be loaded.\n\
# TYPE wastemarket_items_dropped_total counter\n\
wastemarket_items_dropped_total {items_dropped}\n\
# HELP wastemarket_load_duration_seconds_sum Total load time (seconds).\n\
# TYPE wastemarket_load_duration_seconds_sum counter\n\
wastemarket_load_duration_seconds_sum {load_dur_sum_s:.6}\n\
# HELP wastemarket_load_duration_seconds_max Max load time since last scrape (seconds).\n\
# TYPE wastemarket_load_duration_seconds_max gauge\n\
wastemarket_load_duration_seconds_max {load_dur_max_s:.6}\n\
# HELP wastemarket_uploads_total Stored content by backend.\n\
# TYPE wastemarket_uploads_total counter\n\
wastemarket_uploads_total{{backend=\"pinning-service\"}} {uploads_pinning}\n\
wastemarket_uploads_total{{backend=\"paste-service\"}} {uploads_paste}\n\
wastemarket_uploads_total{{backend=\"local-blob\"}} {uploads_local}\n\
# HELP wastemarket_upload_backend_errors_total Remote upload attempts that failed.\n\
# TYPE wastemarket_upload_backend_errors_total counter\n\
wastemarket_upload_backend_errors_total {upload_errors}\n\
# HELP wastemarket_mints_total Mint requests.\n\
# TYPE wastemarket_mints_total counter\n\
wastemarket_mints_total {mints}\n\
# HELP wastemarket_mint_errors_total Failed mints.\n\
# TYPE wastemarket_mint_errors_total counter\n\
wastemarket_mint_errors_total {mint_errors}\n\
# HELP wastemarket_purchases_total Purchase requests.\n\
# TYPE wastemarket_purchases_total counter\n\
wastemarket_purchases_total {purchases}\n\
# HELP wastemarket_purchase_errors_total Failed purchases.\n\
# TYPE wastemarket_purchase_errors_total counter\n\
wastemarket_purchase_errors_total {purchase_errors}\n\
# HELP wastemarket_rpc_failovers_total RPC primary-to-fallback failovers.\n\
# TYPE wastemarket_rpc_failovers_total counter\n\
wastemarket_rpc_failovers_total {rpc_failovers}\n\
# HELP wastemarket_rpc_errors_total RPC errors.\n\
# TYPE wastemarket_rpc_errors_total counter\n\
wastemarket_rpc_errors_total {rpc_errors}\n\
# HELP wastemarket_mirror_errors_total Mirror node errors.\n\
# TYPE wastemarket_mirror_errors_total counter\n\
wastemarket_mirror_errors_total {mirror_errors}\n\
# HELP wastemarket_rpc_circuit_open Whether the primary RPC circuit is open.\n\
# TYPE wastemarket_rpc_circuit_open gauge\n\
wastemarket_rpc_circuit_open {circuit_open}\n"
        )
    }
}
