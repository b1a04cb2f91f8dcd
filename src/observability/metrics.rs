use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub estimates_total: IntCounterVec,
    pub surge_multiplier: Histogram,
    pub surge_fallbacks_total: IntCounter,
    pub unstable_quotes_total: IntCounter,
    pub accept_attempts_total: IntCounterVec,
    pub rejections_total: IntCounter,
    pub bookings_expired_total: IntCounter,
    pub presence_entries: IntGauge,
    pub presence_evictions_total: IntCounter,
    pub notifications_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let estimates_total = IntCounterVec::new(
            Opts::new("estimates_total", "Fare estimates served by kind"),
            &["kind"],
        )
        .expect("valid estimates_total metric");

        let surge_multiplier = Histogram::with_opts(
            HistogramOpts::new("surge_multiplier", "Observed surge multipliers")
                .buckets(vec![1.0, 1.1, 1.25, 1.5, 1.75, 2.0]),
        )
        .expect("valid surge_multiplier metric");

        let surge_fallbacks_total = IntCounter::new(
            "surge_fallbacks_total",
            "Quotes that fell back to the neutral surge multiplier",
        )
        .expect("valid surge_fallbacks_total metric");

        let unstable_quotes_total = IntCounter::new(
            "unstable_quotes_total",
            "Quotes outside the expected price band",
        )
        .expect("valid unstable_quotes_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let rejections_total =
            IntCounter::new("rejections_total", "Booking offers rejected by providers")
                .expect("valid rejections_total metric");

        let bookings_expired_total = IntCounter::new(
            "bookings_expired_total",
            "Pending bookings expired unassigned",
        )
        .expect("valid bookings_expired_total metric");

        let presence_entries =
            IntGauge::new("presence_entries", "Current live presence cache entries")
                .expect("valid presence_entries metric");

        let presence_evictions_total = IntCounter::new(
            "presence_evictions_total",
            "Presence entries evicted as stale",
        )
        .expect("valid presence_evictions_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notifications pushed by channel outcome"),
            &["channel"],
        )
        .expect("valid notifications_total metric");

        registry
            .register(Box::new(estimates_total.clone()))
            .expect("register estimates_total");
        registry
            .register(Box::new(surge_multiplier.clone()))
            .expect("register surge_multiplier");
        registry
            .register(Box::new(surge_fallbacks_total.clone()))
            .expect("register surge_fallbacks_total");
        registry
            .register(Box::new(unstable_quotes_total.clone()))
            .expect("register unstable_quotes_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("register rejections_total");
        registry
            .register(Box::new(bookings_expired_total.clone()))
            .expect("register bookings_expired_total");
        registry
            .register(Box::new(presence_entries.clone()))
            .expect("register presence_entries");
        registry
            .register(Box::new(presence_evictions_total.clone()))
            .expect("register presence_evictions_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");

        Self {
            registry,
            estimates_total,
            surge_multiplier,
            surge_fallbacks_total,
            unstable_quotes_total,
            accept_attempts_total,
            rejections_total,
            bookings_expired_total,
            presence_entries,
            presence_evictions_total,
            notifications_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
