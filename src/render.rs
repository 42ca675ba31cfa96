//! Line-oriented sample rendering.
//!
//! Every sample is one line in the Prometheus exposition text format, with an
//! explicit timestamp in milliseconds:
//!
//! ```text
//! proc_net_dev_rx_kbps{instance="lsvmi",hostname="node1",dev="eth0"} 12.5 1700000000000
//! ```
//!
//! Labels always come in the same order: `instance`, `hostname`, the entity
//! labels in schema order, then the descriptor labels (for descriptor series)
//! or the unit label (for positional counters).

use std::fmt::{self, Write};

/// Name of the label carrying the exporter instance.
pub const INSTANCE_LABEL_NAME: &str = "instance";

/// Name of the label carrying the host name.
pub const HOSTNAME_LABEL_NAME: &str = "hostname";

/// Decimals of the interval sample.
pub const INTERVAL_PRECISION: u8 = 6;

/// Numeric value of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SampleValue {
    /// Integer value, rendered without decimals.
    Unsigned(u64),
    /// Real value, rendered with exactly `precision` decimals.
    Float {
        /// The value.
        value: f64,
        /// Number of decimals.
        precision: u8,
    },
}

impl SampleValue {
    /// Returns the value as `f64`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            SampleValue::Unsigned(v) => v as f64,
            SampleValue::Float { value, .. } => value,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SampleValue::Unsigned(v) => write!(f, "{}", v),
            SampleValue::Float { value, precision } => {
                write!(f, "{:.*}", precision as usize, value)
            }
        }
    }
}

/// Role of a sample in the emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SampleKind {
    /// A counter (delta, rate or gauge) value.
    Counter,
    /// Descriptor assertion, value 1.
    Descriptor,
    /// Descriptor withdrawal, value 0.
    Withdrawal,
    /// The actual interval behind the deltas.
    Interval,
}

/// One rendered time-series sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Metric name with its label set, e.g. `m{instance="i"}`.
    pub series: String,
    /// The value.
    pub value: SampleValue,
    /// Timestamp in milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// Role of the sample.
    pub kind: SampleKind,
}

impl Sample {
    /// Metric name, without labels.
    pub fn name(&self) -> &str {
        series_name(&self.series)
    }

    /// Label pairs in rendering order, unescaped.
    pub fn labels(&self) -> Vec<(String, String)> {
        series_labels(&self.series)
    }

    /// Appends the sample line, newline included, to `out`.
    pub fn write_line(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}", self);
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.series, self.value, self.timestamp_ms)
    }
}

/// Builds series strings with the common `instance` and `hostname` labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renderer {
    instance: String,
    hostname: String,
}

impl Renderer {
    /// Creates a renderer for the given instance and host.
    pub fn new(instance: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            hostname: hostname.into(),
        }
    }

    /// The instance label value.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// The hostname label value.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Renders `metric{instance=..,hostname=..,labels..}`.
    pub fn series<'a, I>(&self, metric: &str, labels: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = String::with_capacity(metric.len() + 64);
        out.push_str(metric);
        out.push('{');
        push_label(&mut out, INSTANCE_LABEL_NAME, &self.instance);
        out.push(',');
        push_label(&mut out, HOSTNAME_LABEL_NAME, &self.hostname);
        for (name, value) in labels {
            out.push(',');
            push_label(&mut out, name, value);
        }
        out.push('}');
        out
    }
}

/// Computes `round(delta * scale / interval_secs, precision)`.
#[inline]
pub fn rate_value(delta: u64, scale: f64, interval_secs: f64, precision: u8) -> SampleValue {
    SampleValue::Float {
        value: delta as f64 * scale / interval_secs,
        precision,
    }
}

fn push_label(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str("=\"");
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Metric name of a rendered series.
pub fn series_name(series: &str) -> &str {
    match series.find('{') {
        Some(pos) => &series[..pos],
        None => series,
    }
}

/// Label pairs of a rendered series, in rendering order, unescaped.
pub fn series_labels(series: &str) -> Vec<(String, String)> {
    let body = match (series.find('{'), series.rfind('}')) {
        (Some(start), Some(end)) if end > start => &series[start + 1..end],
        _ => return Vec::new(),
    };

    let mut labels = Vec::new();
    let mut chars = body.chars().peekable();
    loop {
        let mut name = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            if c != ',' {
                name.push(c);
            }
        }
        if name.is_empty() || chars.next() != Some('"') {
            break;
        }
        let mut value = String::new();
        while let Some(c) = chars.next() {
            match c {
                '"' => break,
                '\\' => match chars.next() {
                    Some('n') => value.push('\n'),
                    Some(other) => value.push(other),
                    None => break,
                },
                c => value.push(c),
            }
        }
        labels.push((name, value));
        if chars.peek().is_none() {
            break;
        }
    }
    labels
}
