#![allow(dead_code)]
use metrics::{describe_counter, describe_histogram, register_counter, register_histogram, Counter, Histogram};
use once_cell::sync::Lazy;

pub static NAMESPACES_ADDED: Lazy<Counter> = Lazy::new(|| {
    const NAME: &str = "xns_cache_namespaces_added";
    describe_counter!(NAME, "number of namespaces added to a multi-namespace informer");
    register_counter!(NAME)
});
pub static NAMESPACES_REMOVED: Lazy<Counter> = Lazy::new(|| {
    const NAME: &str = "xns_cache_namespaces_removed";
    describe_counter!(NAME, "number of namespaces removed from a multi-namespace informer");
    register_counter!(NAME)
});
pub static CACHE_SYNC_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    const NAME: &str = "xns_cache_sync_latency";
    describe_histogram!(NAME, "time spent in wait_for_cache_sync");
    register_histogram!(NAME)
});
pub static CONVERSION_FAILURES: Lazy<Counter> = Lazy::new(|| {
    const NAME: &str = "xns_cache_conversion_failures";
    describe_counter!(NAME, "number of object conversion failures");
    register_counter!(NAME)
});
