//! Table observer for generator statistics and emissions.
//!
//! [`TableObserver`] renders [`FamilyStatsSnapshot`]s, or the samples of an
//! [`Emission`], as a formatted table using the `tabled` crate.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! variazioni = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use variazioni::observers::table::{TableObserver, TableStyle};
//! use variazioni::stats::FamilyStatsSnapshot;
//!
//! let stats = vec![FamilyStatsSnapshot {
//!     family: "proc_net_dev".to_string(),
//!     invocations: 10,
//!     actual: 40,
//!     total: 160,
//!     bytes: 4096,
//! }];
//!
//! let table = TableObserver::new().with_style(TableStyle::Ascii).render_stats(&stats);
//! assert!(table.contains("proc_net_dev"));
//! assert!(table.contains("75.0"));
//! // +--------------+-------------+--------+-------+----------------+-------+
//! // | Family       | Invocations | Actual | Total | Suppressed (%) | Bytes |
//! // +--------------+-------------+--------+-------+----------------+-------+
//! // | proc_net_dev | 10          | 40     | 160   | 75.0           | 4096  |
//! // +--------------+-------------+--------+-------+----------------+-------+
//! ```

use crate::emission::Emission;
use crate::stats::FamilyStatsSnapshot;
use tabled::{settings::Style, Table, Tabled};

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row.
    pub show_header: bool,
    /// Custom title for the table (optional).
    pub title: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
        }
    }
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Invocations")]
    invocations: u64,
    #[tabled(rename = "Actual")]
    actual: u64,
    #[tabled(rename = "Total")]
    total: u64,
    #[tabled(rename = "Suppressed (%)")]
    suppressed: String,
    #[tabled(rename = "Bytes")]
    bytes: u64,
}

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// An observer that renders statistics and samples as tables.
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Creates a new table observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new table observer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Shows or hides the header row.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets a title printed above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn finish(&self, mut table: Table) -> String {
        self.apply_style(&mut table);
        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }
        match &self.config.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    /// Renders one row per family.
    pub fn render_stats(&self, stats: &[FamilyStatsSnapshot]) -> String {
        let rows: Vec<StatsRow> = stats
            .iter()
            .map(|s| StatsRow {
                family: s.family.clone(),
                invocations: s.invocations,
                actual: s.actual,
                total: s.total,
                suppressed: format!("{:.1}", s.suppression_ratio() * 100.0),
                bytes: s.bytes,
            })
            .collect();
        self.finish(Table::new(&rows))
    }

    /// Renders one row per sample, labels joined as `name=value`.
    pub fn render_emission(&self, emission: &Emission) -> String {
        let rows: Vec<SampleRow> = emission
            .samples()
            .iter()
            .map(|s| SampleRow {
                name: s.name().to_string(),
                labels: s
                    .labels()
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(","),
                value: s.value.to_string(),
            })
            .collect();
        self.finish(Table::new(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SuppressionCache;
    use crate::emission::{Cycle, Engine};
    use crate::schema::{CounterKind, FamilySchema};
    use crate::snapshot::{CounterSnapshot, EntitySample};

    fn stats() -> Vec<FamilyStatsSnapshot> {
        vec![
            FamilyStatsSnapshot {
                family: "proc_interrupts".to_string(),
                invocations: 4,
                actual: 10,
                total: 40,
                bytes: 900,
            },
            FamilyStatsSnapshot {
                family: "proc_pid".to_string(),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_render_stats() {
        let table = TableObserver::new().render_stats(&stats());
        assert!(table.contains("Family"));
        assert!(table.contains("proc_interrupts"));
        assert!(table.contains("75.0"));
        assert!(table.contains("0.0"));
    }

    #[test]
    fn test_render_stats_empty() {
        let table = TableObserver::new().render_stats(&[]);
        assert!(table.contains("Family"));
        assert!(!table.contains("proc_"));
    }

    #[test]
    fn test_render_without_header() {
        let table = TableObserver::new().with_header(false).render_stats(&stats());
        assert!(!table.contains("Family"));
        assert!(table.contains("proc_pid"));
    }

    #[test]
    fn test_render_with_title() {
        let table = TableObserver::new()
            .with_title("Generator stats")
            .render_stats(&stats());
        assert!(table.starts_with("Generator stats\n"));
    }

    #[test]
    fn test_render_with_different_styles() {
        for style in [
            TableStyle::Ascii,
            TableStyle::Rounded,
            TableStyle::Sharp,
            TableStyle::Modern,
            TableStyle::Markdown,
            TableStyle::Blank,
        ] {
            let table = TableObserver::new().with_style(style).render_stats(&stats());
            assert!(table.contains("proc_pid"), "style {:?}", style);
        }
    }

    #[test]
    fn test_render_emission() {
        let schema = FamilySchema::new("pool")
            .with_entity_label("name")
            .with_counter("pool_free", CounterKind::Gauge);
        let engine = Engine::new(schema).unwrap().with_instance("i").with_hostname("h");
        let mut snap = CounterSnapshot::new();
        snap.insert("buf", EntitySample::new(["buf"], [17]));
        let emission = engine
            .generate(&Cycle::new(&snap, 0), &mut SuppressionCache::new())
            .unwrap();

        let table = TableObserver::new().render_emission(&emission);
        assert!(table.contains("pool_free"));
        assert!(table.contains("instance=i,hostname=h,name=buf"));
        assert!(table.contains("17"));
    }
}
