use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{MetricKey, Sample};

/// On-disk shape: two parallel dictionaries keyed by metric key.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(rename = "Data", default)]
    data: BTreeMap<MetricKey, f64>,
    #[serde(rename = "Timestamps", default)]
    timestamps: BTreeMap<MetricKey, i64>,
}

pub fn encode_snapshot(entries: &HashMap<MetricKey, Sample>) -> serde_json::Result<Vec<u8>> {
    let mut snapshot = Snapshot::default();
    for (key, sample) in entries {
        if !sample.value.is_finite() {
            tracing::debug!(key = %key, value = sample.value, "omitting non-finite value from snapshot");
            continue;
        }
        snapshot.data.insert(key.clone(), sample.value);
        snapshot.timestamps.insert(key.clone(), sample.time);
    }
    serde_json::to_vec(&snapshot)
}

/// Keys present in only one of the two dictionaries are dropped.
pub fn decode_snapshot(buf: &[u8]) -> serde_json::Result<HashMap<MetricKey, Sample>> {
    let Snapshot {
        data,
        mut timestamps,
    } = serde_json::from_slice(buf)?;
    let mut entries = HashMap::with_capacity(data.len());
    for (key, value) in data {
        let Some(time) = timestamps.remove(&key) else {
            tracing::debug!(key = %key, "dropping snapshot value without timestamp");
            continue;
        };
        entries.insert(key, Sample { time, value });
    }
    for key in timestamps.keys() {
        tracing::debug!(key = %key, "dropping snapshot timestamp without value");
    }
    Ok(entries)
}
