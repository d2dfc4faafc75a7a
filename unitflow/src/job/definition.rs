//! Immutable job and unit declarations.

use chrono::NaiveTime;
use indexmap::IndexMap;

use crate::units::UnitConfig;

/// Identity of a unit declaration: the owning job and its position in the
/// chain. Runtime state is keyed by this, not stored on the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Owning job id.
    pub job: String,
    /// Zero-based position in the job's unit chain.
    pub index: usize,
}

/// One declared pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    /// Node identity.
    pub id: NodeId,
    /// Declared type name, e.g. `Foreach`.
    pub unit_type: String,
    /// Declared attributes; names lower-cased.
    pub attributes: IndexMap<String, String>,
    /// Free-form text body.
    pub content: String,
}

impl UnitDefinition {
    /// The configuration handed to a new instance of this unit.
    #[must_use]
    pub fn config(&self) -> UnitConfig {
        UnitConfig::new(&self.unit_type, &self.attributes, &self.content)
    }

    /// The `label` attribute, else the type name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.attributes
            .get("label")
            .map_or(self.unit_type.as_str(), String::as_str)
    }
}

/// Daily window during which a job is eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Window start, exclusive.
    pub from: NaiveTime,
    /// Window end, exclusive.
    pub to: NaiveTime,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            from: NaiveTime::MIN,
            to: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl TimeWindow {
    /// Builds a window from optional `HH:MM:SS` (or `HH:MM`) bounds.
    ///
    /// A missing or unparsable bound falls back to the full-day default
    /// for that end and is logged.
    #[must_use]
    pub fn parse(job: &str, from: Option<&str>, to: Option<&str>) -> Self {
        let default = Self::default();
        Self {
            from: parse_bound(job, "from", from).unwrap_or(default.from),
            to: parse_bound(job, "to", to).unwrap_or(default.to),
        }
    }

    /// True when `now` lies strictly between the bounds.
    #[must_use]
    pub fn contains(&self, now: NaiveTime) -> bool {
        self.from < now && now < self.to
    }
}

fn parse_bound(job: &str, name: &str, value: Option<&str>) -> Option<NaiveTime> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    let parsed = NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"));
    match parsed {
        Ok(time) => Some(time),
        Err(_) => {
            tracing::warn!(job, bound = name, value, "Unparsable time window bound, using default");
            None
        }
    }
}

/// One named, time-windowed unit chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    /// Job id.
    pub id: String,
    /// Eligibility window.
    pub window: TimeWindow,
    /// Ordered unit chain.
    pub units: Vec<UnitDefinition>,
}

impl JobDefinition {
    /// Creates a job with the default window and no units.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            window: TimeWindow::default(),
            units: Vec::new(),
        }
    }

    /// Sets the eligibility window.
    #[must_use]
    pub const fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Appends a unit declaration.
    #[must_use]
    pub fn with_unit<I, K, V>(mut self, unit_type: &str, attributes: I, content: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let id = NodeId {
            job: self.id.clone(),
            index: self.units.len(),
        };
        self.units.push(UnitDefinition {
            id,
            unit_type: unit_type.to_string(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                .collect(),
            content: content.to_string(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_window_bounds_are_exclusive() {
        let window = TimeWindow::parse("j", Some("08:00:00"), Some("18:00:00"));

        assert!(window.contains(t(12, 0, 0)));
        assert!(!window.contains(t(8, 0, 0)));
        assert!(!window.contains(t(18, 0, 0)));
        assert!(!window.contains(t(7, 59, 59)));
    }

    #[test]
    fn test_window_defaults_to_full_day() {
        let window = TimeWindow::parse("j", None, Some("not a time"));
        assert_eq!(window, TimeWindow::default());
        assert!(window.contains(t(0, 0, 1)));
        assert!(!window.contains(t(0, 0, 0)));
        assert!(!window.contains(t(23, 59, 59)));
    }

    #[test]
    fn test_window_accepts_hours_and_minutes() {
        let window = TimeWindow::parse("j", Some("06:30"), None);
        assert_eq!(window.from, t(6, 30, 0));
    }

    #[test]
    fn test_builder_numbers_nodes() {
        let job = JobDefinition::new("nightly")
            .with_unit("Foreach", [("Path", "rows"), ("label", "rows")], "")
            .with_unit("Script", Vec::<(&str, &str)>::new(), "input.x = 1;");

        assert_eq!(job.units[1].id, NodeId { job: "nightly".into(), index: 1 });
        assert_eq!(job.units[0].attributes.get("path").map(String::as_str), Some("rows"));
        assert_eq!(job.units[0].label(), "rows");
        assert_eq!(job.units[1].label(), "Script");
        assert_eq!(job.units[1].config().content(), "input.x = 1;");
    }
}
