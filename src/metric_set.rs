use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{SampleError, StoreError},
    sampling::{compute_value, MetricValue, RawValue, SourceType},
    store::Storer,
    MetricKey, Sample,
};

const NAMESPACE_SEPARATOR: &str = "::";
const ATTRIBUTE_SEPARATOR: &str = "==";
const ESCAPE: char = '\\';
/// Serialized next to the metrics, so no metric may take this name.
pub const EVENT_TYPE: &str = "event_type";

/// Pre-aggregated values that bypass sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Aggregate {
    Count {
        count: f64,
    },
    Summary {
        count: f64,
        sum: f64,
        min: f64,
        max: f64,
    },
}

/// Declares how a metric is reported and what to report when it is not observed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricDefinition {
    pub name: MetricKey,
    pub source_type: SourceType,
    #[serde(default)]
    pub default: Option<MetricValue>,
}

/// Derived values of one reporting event.
///
/// Every set created from the same store handle shares it; the mutex is the
/// only synchronization the store gets.
#[derive(Debug, Serialize)]
pub struct MetricSet<S> {
    event_type: String,
    #[serde(flatten)]
    metrics: BTreeMap<MetricKey, MetricValue>,
    #[serde(flatten)]
    aggregates: BTreeMap<MetricKey, Aggregate>,
    #[serde(skip)]
    namespace: String,
    #[serde(skip)]
    store: Arc<Mutex<S>>,
}
impl<S: Storer> MetricSet<S> {
    pub fn new(event_type: impl Into<String>, store: Arc<Mutex<S>>) -> Self {
        Self {
            event_type: event_type.into(),
            metrics: BTreeMap::new(),
            aggregates: BTreeMap::new(),
            namespace: String::new(),
            store,
        }
    }
    /// A set whose sampled metrics are remembered under keys prefixed by the
    /// identity `attributes`, so entities sharing a store keep apart.
    ///
    /// The attributes are reported as attribute metrics too, except one named
    /// [`EVENT_TYPE`] which only scopes the keys.
    pub fn with_namespace<K, V>(
        event_type: impl Into<String>,
        store: Arc<Mutex<S>>,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new(event_type, store);
        let mut attributes: Vec<(String, String)> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        attributes.sort();
        for (key, value) in attributes {
            push_escaped(&mut set.namespace, &key);
            set.namespace.push_str(ATTRIBUTE_SEPARATOR);
            push_escaped(&mut set.namespace, &value);
            set.namespace.push_str(NAMESPACE_SEPARATOR);
            if key == EVENT_TYPE {
                tracing::warn!(attribute = %key, "reserved attribute name is not reported");
                continue;
            }
            set.metrics.insert(key, MetricValue::Text(value));
        }
        set
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }
    pub fn metrics(&self) -> &BTreeMap<MetricKey, MetricValue> {
        &self.metrics
    }
    pub fn aggregates(&self) -> &BTreeMap<MetricKey, Aggregate> {
        &self.aggregates
    }
    pub fn len(&self) -> usize {
        self.metrics.len() + self.aggregates.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derives and records `name`. On error nothing is recorded and the rest
    /// of the set is unaffected.
    pub fn set_metric(
        &mut self,
        name: &str,
        value: impl Into<RawValue>,
        source_type: SourceType,
    ) -> Result<(), SampleError> {
        check_name(name, &self.aggregates)?;
        let raw = value.into();
        let derived = {
            // the store holds plain data, a panicked holder cannot leave it torn
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            let mut store = Namespaced {
                prefix: &self.namespace,
                inner: &mut *store,
            };
            compute_value(name, &raw, source_type, &mut store)?
        };
        self.metrics.insert(name.to_owned(), derived);
        Ok(())
    }
    /// Like [`Self::set_metric`] with the source type given by name.
    pub fn set_metric_kind(
        &mut self,
        name: &str,
        value: impl Into<RawValue>,
        source_type: &str,
    ) -> Result<(), SampleError> {
        let source_type = source_type
            .parse()
            .map_err(|_| SampleError::UnknownSourceType {
                name: name.to_owned(),
            })?;
        self.set_metric(name, value, source_type)
    }
    pub fn set_aggregate(
        &mut self,
        name: &str,
        aggregate: Aggregate,
    ) -> Result<(), SampleError> {
        check_name(name, &self.metrics)?;
        self.aggregates.insert(name.to_owned(), aggregate);
        Ok(())
    }

    /// Sets every defined metric from `lookup`, falling back to its default.
    ///
    /// Failures are collected rather than stopping at the first one.
    pub fn apply_definitions(
        &mut self,
        definitions: &[MetricDefinition],
        lookup: impl Fn(&str) -> Option<RawValue>,
    ) -> Vec<SampleError> {
        let mut errors = vec![];
        for def in definitions {
            let raw = lookup(&def.name).or_else(|| {
                def.default.as_ref().map(|default| match default {
                    MetricValue::Number(v) => RawValue::Float(*v),
                    MetricValue::Text(s) => RawValue::Str(s.clone()),
                })
            });
            let Some(raw) = raw else {
                continue;
            };
            if let Err(e) = self.set_metric(&def.name, raw, def.source_type) {
                errors.push(e);
            }
        }
        errors
    }
}

/// `name` must not be reserved nor already taken in `other`, since both maps
/// end up as keys of the same JSON object.
fn check_name<V>(name: &str, other: &BTreeMap<MetricKey, V>) -> Result<(), SampleError> {
    if name == EVENT_TYPE {
        return Err(SampleError::ReservedName {
            name: name.to_owned(),
        });
    }
    if other.contains_key(name) {
        return Err(SampleError::DuplicateName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Separator characters inside a component are backslash-escaped, so distinct
/// attribute sets never join into the same store key.
fn push_escaped(out: &mut String, component: &str) {
    for c in component.chars() {
        if matches!(c, ESCAPE | ':' | '=') {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

struct Namespaced<'a, S: ?Sized> {
    prefix: &'a str,
    inner: &'a mut S,
}
impl<S: ?Sized> Namespaced<'_, S> {
    fn key(&self, name: &str) -> String {
        let mut key = String::with_capacity(self.prefix.len() + name.len());
        key.push_str(self.prefix);
        push_escaped(&mut key, name);
        key
    }
}
impl<S: Storer + ?Sized> Storer for Namespaced<'_, S> {
    fn get(&self, name: &str) -> Option<Sample> {
        self.inner.get(&self.key(name))
    }
    fn set(&mut self, name: &str, value: f64) -> i64 {
        let key = self.key(name);
        self.inner.set(&key, value)
    }
    fn delete(&mut self, name: &str) {
        let key = self.key(name);
        self.inner.delete(&key);
    }
    fn save(&self) -> Result<(), StoreError> {
        self.inner.save()
    }
}
