//! Data types shared across the query, discovery, and API crates.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of the range-query window and its resolution step.
///
/// Matches the 1s call interval the host platform uses to poll the metric
/// query endpoint: each poll asks for the samples resolved during the last
/// interval. A host polling at a different cadence would miss or duplicate
/// samples, so the same constant drives the advertised call interval.
pub const DEFAULT_STEP: Duration = Duration::from_secs(1);

/// Target type id for discovered Prometheus instances.
pub const INSTANCE_TARGET_TYPE: &str = "prometheus-instance";

/// Attribute carrying the instance name on discovered targets.
pub const ATTR_INSTANCE_NAME: &str = "instance.name";

/// Attribute carrying the instance base URL on discovered targets.
pub const ATTR_INSTANCE_URL: &str = "instance.url";

/// One metric sample returned to the host platform.
///
/// Finite values serialize as JSON numbers. JSON has no NaN or infinity, so
/// those serialize as the strings Prometheus itself uses: `"NaN"`, `"+Inf"`
/// and `"-Inf"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Flattened label set of the series the sample belongs to.
    #[serde(rename = "metric")]
    pub labels: BTreeMap<String, String>,
    #[serde(with = "sample_value")]
    pub value: f64,
}

mod sample_value {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value == f64::INFINITY {
            serializer.serialize_str("+Inf")
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str("-Inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "+Inf" | "Inf" => Ok(f64::INFINITY),
                "-Inf" => Ok(f64::NEG_INFINITY),
                other => Err(de::Error::invalid_value(
                    de::Unexpected::Str(other),
                    &"a number, \"NaN\", \"+Inf\" or \"-Inf\"",
                )),
            },
        }
    }
}

/// A discoverable target handed to the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub label: String,
    pub target_type: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// A single metric query invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Name of the instance to query.
    pub instance: String,
    /// PromQL expression. `None` when the caller did not provide one.
    pub query: Option<String>,
    /// Evaluation time; the window ends here.
    pub timestamp: DateTime<Utc>,
    /// Window width and resolution.
    pub step: Duration,
}

impl QueryRequest {
    pub fn new(
        instance: impl Into<String>,
        query: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instance: instance.into(),
            query,
            timestamp,
            step: DEFAULT_STEP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sample_serializes_labels_as_metric() {
        let sample = Sample {
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_500).unwrap(),
            labels: BTreeMap::from([("job".to_string(), "prometheus".to_string())]),
            value: 1.0,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["metric"]["job"], "prometheus");
        assert_eq!(json["value"], 1.0);
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20.500Z");
    }

    fn sample_with(value: f64) -> Sample {
        Sample {
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            labels: BTreeMap::new(),
            value,
        }
    }

    #[test]
    fn non_finite_values_serialize_as_prometheus_strings() {
        for (value, text) in [(f64::NAN, "NaN"), (f64::INFINITY, "+Inf"), (f64::NEG_INFINITY, "-Inf")] {
            let json = serde_json::to_value(sample_with(value)).unwrap();
            assert_eq!(json["value"], text);
        }
    }

    #[test]
    fn sample_value_reads_numbers_and_strings() {
        let json = serde_json::to_string(&sample_with(f64::NEG_INFINITY)).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, f64::NEG_INFINITY);

        let nan: Sample = serde_json::from_value(serde_json::json!({
            "timestamp": "2023-11-14T22:13:20Z",
            "metric": {},
            "value": "NaN",
        }))
        .unwrap();
        assert!(nan.value.is_nan());

        let bad = serde_json::from_value::<Sample>(serde_json::json!({
            "timestamp": "2023-11-14T22:13:20Z",
            "metric": {},
            "value": "lots",
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn target_uses_camel_case() {
        let target = Target {
            id: "prom".to_string(),
            label: "prom".to_string(),
            target_type: INSTANCE_TARGET_TYPE.to_string(),
            attributes: BTreeMap::new(),
        };
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["targetType"], INSTANCE_TARGET_TYPE);
    }

    #[test]
    fn query_request_defaults_to_one_second_step() {
        let req = QueryRequest::new("prom", Some("up".to_string()), Utc::now());
        assert_eq!(req.step, Duration::from_secs(1));
    }
}
