//! One collection cycle over the host's network interfaces.
//!
//! Run it twice within a minute to see rates:
//! `RUST_LOG=debug cargo run --example collector`

use std::sync::{Arc, Mutex};

use metrics_persist::{
    MetricSet, SampleError, SourceType, Store, StoreConfig, Storer, SystemClock,
};
use sysinfo::{Networks, System};
use tracing_subscriber::EnvFilter;

const INTEGRATION: &str = "host-network";

fn report(name: &str, result: Result<(), SampleError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_skip() => tracing::debug!(metric = name, "{e}"),
        Err(e) => tracing::warn!(metric = name, "{e}"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = StoreConfig::from_env()?;
    let store = Store::for_integration(INTEGRATION, &config, Arc::new(SystemClock))?;
    tracing::info!(path = ?store.path(), entries = store.len(), "store opened");
    let store = Arc::new(Mutex::new(store));

    let mut sets = vec![];

    let mut sys = System::new();
    sys.refresh_memory();
    let mut host = MetricSet::new("SystemSample", store.clone());
    if let Some(hostname) = System::host_name() {
        report("hostname", host.set_metric("hostname", hostname, SourceType::Attribute));
    }
    report("uptime", host.set_metric("uptime", System::uptime(), SourceType::Gauge));
    report(
        "memory_used_bytes",
        host.set_metric("memory_used_bytes", sys.used_memory(), SourceType::Gauge),
    );
    sets.push(host);

    let networks = Networks::new_with_refreshed_list();
    for (iface, data) in &networks {
        let mut set = MetricSet::with_namespace(
            "NetworkSample",
            store.clone(),
            [("interface", iface.as_str())],
        );
        let counters = [
            ("rx_bytes_per_second", data.total_received(), SourceType::Rate),
            ("tx_bytes_per_second", data.total_transmitted(), SourceType::Rate),
            ("rx_packets", data.total_packets_received(), SourceType::Delta),
            ("tx_packets", data.total_packets_transmitted(), SourceType::Delta),
            ("rx_errors", data.total_errors_on_received(), SourceType::PDelta),
        ];
        for (name, value, source_type) in counters {
            report(name, set.set_metric(name, value, source_type));
        }
        sets.push(set);
    }

    println!("{}", serde_json::to_string_pretty(&sets)?);

    let store = store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    store.save()?;
    Ok(())
}
