use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::Instant;

pub const GATEHOUSE_DISPATCH_TOTAL: &str = "gatehouse_dispatch_total";
pub const GATEHOUSE_REQUEST_DURATION_SECONDS: &str = "gatehouse_request_duration_seconds";
pub const GATEHOUSE_CONNECTIONS_TOTAL: &str = "gatehouse_connections_total";
pub const GATEHOUSE_WISP_STREAMS_TOTAL: &str = "gatehouse_wisp_streams_total";
pub const GATEHOUSE_BARE_REQUESTS_TOTAL: &str = "gatehouse_bare_requests_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        GATEHOUSE_DISPATCH_TOTAL,
        Unit::Count,
        "Requests and upgrades dispatched, labelled by route."
    );
    describe_histogram!(
        GATEHOUSE_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent producing a response, labelled by route."
    );
    describe_counter!(
        GATEHOUSE_CONNECTIONS_TOTAL,
        Unit::Count,
        "TCP connections accepted by the listener."
    );
    describe_counter!(
        GATEHOUSE_WISP_STREAMS_TOTAL,
        Unit::Count,
        "Tunnel streams opened to remote hosts, labelled by transport."
    );
    describe_counter!(
        GATEHOUSE_BARE_REQUESTS_TOTAL,
        Unit::Count,
        "Requests served by the bare engine, labelled by kind."
    );
});

fn describe() {
    Lazy::force(&DESCRIBED);
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

pub fn increment_dispatch(route: &'static str) {
    describe();
    counter!(GATEHOUSE_DISPATCH_TOTAL, "route" => route).increment(1);
}

pub fn increment_connections() {
    counter!(GATEHOUSE_CONNECTIONS_TOTAL).increment(1);
}

pub fn increment_wisp_streams(kind: &'static str) {
    counter!(GATEHOUSE_WISP_STREAMS_TOTAL, "type" => kind).increment(1);
}

pub fn increment_bare_requests(kind: &'static str) {
    counter!(GATEHOUSE_BARE_REQUESTS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_request_duration(route: &'static str, duration: std::time::Duration) {
    histogram!(GATEHOUSE_REQUEST_DURATION_SECONDS, "route" => route)
        .record(duration.as_secs_f64());
}

// Records the elapsed time for one route when dropped
pub struct RequestTimer {
    start: Instant,
    route: &'static str,
}

impl RequestTimer {
    pub fn new(route: &'static str) -> Self {
        Self {
            start: Instant::now(),
            route,
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(self.route, self.start.elapsed());
    }
}
