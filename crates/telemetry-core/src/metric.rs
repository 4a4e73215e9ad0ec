// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The metric entity shared by the agent and the collector.
//!
//! A [`Metric`] is identified by its `id` and carries a [`MetricKind`]. Exactly
//! one value slot is populated for a metric that holds data: `delta` for
//! counters, `value` for gauges. A metric with neither slot set means "no data
//! yet" and is never persisted.
//!
//! The wire/snapshot representation is the JSON object
//! `{"id": "...", "type": "gauge"|"counter", "value"|"delta": ...}`.

use crate::errors::MetricError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Accumulates by addition on every write.
    Counter,
    /// Replaced by the latest write.
    Gauge,
}

impl MetricKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(MetricError::InvalidKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    #[must_use]
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    #[must_use]
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// A metric carrying only its identity, used for lookups and for slots
    /// that have not been sampled yet.
    #[must_use]
    pub fn empty(id: impl Into<String>, kind: MetricKind) -> Self {
        Metric {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }

    /// Builds a metric from its textual components, e.g. the segments of
    /// `/update/{type}/{id}/{value}`. An empty `raw` yields an empty metric.
    pub fn parse(kind: &str, id: &str, raw: &str) -> Result<Self, MetricError> {
        let kind = MetricKind::from_str(kind)?;
        if id.is_empty() {
            return Err(MetricError::MissingId);
        }
        let mut metric = Metric::empty(id, kind);
        if raw.is_empty() {
            return Ok(metric);
        }
        match kind {
            MetricKind::Counter => {
                let delta = raw
                    .parse::<i64>()
                    .map_err(|_| MetricError::InvalidValue(raw.to_string()))?;
                metric.delta = Some(delta);
            }
            MetricKind::Gauge => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| MetricError::InvalidValue(raw.to_string()))?;
                if !value.is_finite() {
                    return Err(MetricError::InvalidValue(raw.to_string()));
                }
                metric.value = Some(value);
            }
        }
        Ok(metric)
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.delta.is_some() || self.value.is_some()
    }

    /// Checks that exactly the slot matching the kind is populated.
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.id.is_empty() {
            return Err(MetricError::MissingId);
        }
        match (self.kind, self.delta, self.value) {
            (MetricKind::Counter, Some(_), None) | (MetricKind::Gauge, None, Some(_)) => Ok(()),
            (_, Some(_), Some(_)) => Err(MetricError::BothValues(self.id.clone())),
            (MetricKind::Counter, None, _) | (MetricKind::Gauge, _, None) => {
                Err(MetricError::MissingValue {
                    id: self.id.clone(),
                    kind: self.kind,
                })
            }
        }
    }

    /// Applies `self` as an incoming write on top of `stored` and returns the
    /// new stored state.
    ///
    /// Counters accumulate onto the stored delta (the first write seeds it),
    /// gauges replace unconditionally. Only the incoming kind is consulted; the
    /// kind previously stored under the same id is not checked. A counter sum
    /// outside the `i64` range is rejected and leaves the stored state as is.
    pub fn merged_onto(mut self, stored: Option<&Metric>) -> Result<Metric, MetricError> {
        if self.kind == MetricKind::Counter {
            if let (Some(incoming), Some(old)) = (self.delta, stored.and_then(|m| m.delta)) {
                let sum = old
                    .checked_add(incoming)
                    .ok_or_else(|| MetricError::Overflow(self.id.clone()))?;
                self.delta = Some(sum);
            }
        }
        Ok(self)
    }

    /// Textual value as served by `GET /value/{type}/{id}`.
    #[must_use]
    pub fn value_string(&self) -> Option<String> {
        match self.kind {
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
            MetricKind::Gauge => self.value.map(|v| v.to_string()),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_string() {
            Some(v) => write!(f, "{}: {}", self.id, v),
            None => write!(f, "{}: <empty>", self.id),
        }
    }
}
