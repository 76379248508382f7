use crate::types::Rcode;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref UPSTREAM_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "dnsproxy_upstream_request_duration_seconds",
        "Histogram of the time each upstream exchange took.",
        &["client", "rcode", "to"],
        vec![0.00025, 0.0005, 0.001, 0.002, 0.004, 0.008, 0.016, 0.032, 0.064, 0.128, 0.256, 0.512, 1.024, 2.048, 4.096, 8.192]
    ).expect("metric can be registered");

    pub static ref UPSTREAM_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsproxy_upstream_failures_total",
        "Counter of failed exchanges per client and upstream.",
        &["client", "to"]
    ).expect("metric can be registered");

    pub static ref TRUNCATED_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsproxy_truncated_retries_total",
        "Counter of truncated UDP responses retried over TCP.",
        &["client"]
    ).expect("metric can be registered");

    pub static ref CERTIFICATE_FETCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsproxy_dnscrypt_certificate_fetches_total",
        "Counter of DNSCrypt certificate lookups by result.",
        &["result"]
    ).expect("metric can be registered");

    pub static ref RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsproxy_resolutions_total",
        "Counter of pool resolutions by outcome.",
        &["result"]
    ).expect("metric can be registered");
}

pub fn observe_exchange(client: &str, upstream: &str, rcode: Rcode, seconds: f64) {
    UPSTREAM_REQUEST_DURATION
        .with_label_values(&[client, rcode.as_str(), upstream])
        .observe(seconds);
}

pub fn record_failure(client: &str, upstream: &str) {
    UPSTREAM_FAILURES_TOTAL.with_label_values(&[client, upstream]).inc();
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        observe_exchange("plain", "udp://127.0.0.1:53", Rcode::NxDomain, 0.01);
        record_failure("doh", "https://example.invalid/dns-query");
        RESOLUTIONS_TOTAL.with_label_values(&["success"]).inc();

        let text = render();
        assert!(text.contains("dnsproxy_upstream_request_duration_seconds"));
        assert!(text.contains("rcode=\"NXDOMAIN\""));
        assert!(text.contains("dnsproxy_upstream_failures_total"));
        assert!(text.contains("dnsproxy_resolutions_total"));
    }
}
