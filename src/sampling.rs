use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{error::SampleError, store::Storer};

/// How a raw observation turns into the reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Reported as observed.
    Gauge,
    /// Change per second since the previous sample.
    Rate,
    /// Change since the previous sample.
    Delta,
    /// Rate that is never negative.
    PRate,
    /// Delta that is never negative.
    PDelta,
    /// Reported as observed; must be a string.
    Attribute,
}
impl SourceType {
    pub const ALL: [SourceType; 6] = [
        Self::Gauge,
        Self::Rate,
        Self::Delta,
        Self::PRate,
        Self::PDelta,
        Self::Attribute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Rate => "rate",
            Self::Delta => "delta",
            Self::PRate => "prate",
            Self::PDelta => "pdelta",
            Self::Attribute => "attribute",
        }
    }
    /// Whether the derived value depends on the previous sample.
    pub fn is_sampled(&self) -> bool {
        matches!(self, Self::Rate | Self::Delta | Self::PRate | Self::PDelta)
    }
}
impl core::fmt::Display for SourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSourceType(pub String);
impl core::fmt::Display for UnknownSourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown source type {:?}", self.0)
    }
}
impl std::error::Error for UnknownSourceType {}

impl FromStr for SourceType {
    type Err = UnknownSourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSourceType(s.to_owned()))
    }
}

/// A reading as handed over by a collector, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bool(bool),
}
impl RawValue {
    /// `None` unless the value is a finite number or a string holding one.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Int(v) => *v as f64,
            Self::UInt(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Str(s) => s.trim().parse().ok()?,
            Self::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}
macro_rules! impl_from_raw {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for RawValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}
impl_from_raw! {
    i8 => Int, i16 => Int, i32 => Int, i64 => Int,
    u8 => UInt, u16 => UInt, u32 => UInt, u64 => UInt,
    f32 => Float, f64 => Float,
    bool => Bool, String => Str, &str => Str,
}

/// The value that gets reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}
impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

/// Validates `raw` against `source_type` and derives the value to report.
///
/// Counter kinds write the new raw sample through to `store` before the
/// derived value is computed, so a skipped round still leaves a fresh
/// baseline for the next one. A negative difference is always taken as a
/// counter reset, even when it is a transient low reading. A sample older
/// than the stored one means the clock went backwards and is skipped too.
pub fn compute_value<S>(
    name: &str,
    raw: &RawValue,
    source_type: SourceType,
    store: &mut S,
) -> Result<MetricValue, SampleError>
where
    S: Storer + ?Sized,
{
    match source_type {
        SourceType::Attribute => match raw {
            RawValue::Str(s) => Ok(MetricValue::Text(s.clone())),
            _ => Err(SampleError::InvalidAttribute {
                name: name.to_owned(),
            }),
        },
        SourceType::Gauge => numeric(name, raw).map(MetricValue::Number),
        SourceType::Rate | SourceType::Delta | SourceType::PRate | SourceType::PDelta => {
            let value = numeric(name, raw)?;
            sample(name, value, source_type, store).map(MetricValue::Number)
        }
    }
}

fn numeric(name: &str, raw: &RawValue) -> Result<f64, SampleError> {
    raw.as_f64().ok_or_else(|| SampleError::NonNumeric {
        name: name.to_owned(),
    })
}

fn sample<S>(
    name: &str,
    value: f64,
    source_type: SourceType,
    store: &mut S,
) -> Result<f64, SampleError>
where
    S: Storer + ?Sized,
{
    let previous = store.get(name);
    let time = store.set(name, value);
    let Some(previous) = previous else {
        return Ok(0.0);
    };
    let duration = time - previous.time;
    if duration == 0 {
        return Err(SampleError::TooClose {
            name: name.to_owned(),
        });
    }
    if duration < 0 {
        return Err(SampleError::ClockWentBack {
            name: name.to_owned(),
        });
    }
    let diff = value - previous.value;
    if diff < 0.0 {
        return Err(SampleError::Reset {
            name: name.to_owned(),
        });
    }
    Ok(match source_type {
        SourceType::Rate | SourceType::PRate => diff / duration as f64,
        _ => diff,
    })
}
