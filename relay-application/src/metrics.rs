use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    deliveries: AtomicU64,
    duplicates: AtomicU64,
    relays: AtomicU64,
    errors: AtomicU64,
}

impl Metrics {
    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relays(&self, count: usize) {
        self.relays.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        let deliveries = self.deliveries.load(Ordering::Relaxed);
        let duplicates = self.duplicates.load(Ordering::Relaxed);
        let relays = self.relays.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);

        format!(
            "# TYPE cftools_relay_deliveries_total counter\n\
cftools_relay_deliveries_total {}\n\
# TYPE cftools_relay_duplicates_total counter\n\
cftools_relay_duplicates_total {}\n\
# TYPE cftools_relay_relays_total counter\n\
cftools_relay_relays_total {}\n\
# TYPE cftools_relay_errors_total counter\n\
cftools_relay_errors_total {}\n",
            deliveries, duplicates, relays, errors
        )
    }
}
