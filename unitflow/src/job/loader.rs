//! Job file parsing.
//!
//! ```xml
//! <jobs>
//!   <job id="orders" from="06:00:00" to="22:00:00">
//!     <unit type="Select">SELECT * FROM orders WHERE sent = 0</unit>
//!     <unit type="Mail" to="@email" subject="Order @id">Order $id shipped</unit>
//!   </job>
//! </jobs>
//! ```
//!
//! Only `unit` children of `job` children of the `jobs` root are read. A
//! unit's body is the concatenated text of everything inside it.

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashSet;

use super::{JobDefinition, NodeId, TimeWindow, UnitDefinition};
use crate::errors::ConfigurationError;

const ROOT: &[u8] = b"jobs";
const JOB: &[u8] = b"job";
const UNIT: &[u8] = b"unit";

fn attributes(start: &BytesStart<'_>) -> Result<IndexMap<String, String>, ConfigurationError> {
    let mut attrs = IndexMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ConfigurationError::job_source(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
        let value = attr
            .unescape_value()
            .map_err(|e| ConfigurationError::job_source(e.to_string()))?;
        attrs.insert(key, value.into_owned());
    }
    Ok(attrs)
}

#[derive(Debug, Default)]
struct JobFileParser {
    jobs: Vec<JobDefinition>,
    seen: HashSet<String>,
    job: Option<JobDefinition>,
    unit: Option<UnitDefinition>,
    depth: usize,
}

impl JobFileParser {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), ConfigurationError> {
        self.depth += 1;
        let name = start.name();
        match self.depth {
            1 if name.as_ref() != ROOT => Err(ConfigurationError::job_source(format!(
                "root element must be <jobs>, found <{}>",
                String::from_utf8_lossy(name.as_ref())
            ))),
            2 if name.as_ref() == JOB => self.open_job(start),
            3 if name.as_ref() == UNIT => self.open_unit(start),
            _ => Ok(()),
        }
    }

    fn open_job(&mut self, start: &BytesStart<'_>) -> Result<(), ConfigurationError> {
        let attrs = attributes(start)?;
        let id = attrs
            .get("id")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConfigurationError::job_source("job without id"))?;
        if !self.seen.insert(id.clone()) {
            tracing::warn!(job = %id, "Duplicate job id, both jobs are kept");
        }
        let window = TimeWindow::parse(
            &id,
            attrs.get("from").map(String::as_str),
            attrs.get("to").map(String::as_str),
        );
        self.job = Some(JobDefinition::new(id).with_window(window));
        Ok(())
    }

    fn open_unit(&mut self, start: &BytesStart<'_>) -> Result<(), ConfigurationError> {
        let Some(job) = &self.job else {
            return Ok(());
        };
        let mut attrs = attributes(start)?;
        let unit_type = attrs
            .shift_remove("type")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ConfigurationError::job_source(format!("unit without type in job '{}'", job.id))
            })?;
        self.unit = Some(UnitDefinition {
            id: NodeId {
                job: job.id.clone(),
                index: job.units.len(),
            },
            unit_type,
            attributes: attrs,
            content: String::new(),
        });
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(unit) = &mut self.unit {
            unit.content.push_str(text);
        }
    }

    fn close(&mut self) {
        match self.depth {
            3 => {
                if let (Some(job), Some(unit)) = (&mut self.job, self.unit.take()) {
                    job.units.push(unit);
                }
            }
            2 => {
                if let Some(job) = self.job.take() {
                    self.jobs.push(job);
                }
            }
            _ => {}
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Parses a job file.
///
/// # Errors
///
/// Returns [`ConfigurationError::JobSource`] for malformed XML, a wrong
/// root element, a job without `id` or a unit without `type`.
pub fn parse_jobs(text: &str) -> Result<Vec<JobDefinition>, ConfigurationError> {
    let mut reader = Reader::from_str(text);
    let mut parser = JobFileParser::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            ConfigurationError::job_source(format!("at position {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => parser.open(&start)?,
            Event::Empty(start) => {
                parser.open(&start)?;
                parser.close();
            }
            Event::End(_) => parser.close(),
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ConfigurationError::job_source(e.to_string()))?;
                parser.text(&text);
            }
            Event::CData(data) => parser.text(&String::from_utf8_lossy(&data.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }

    if parser.depth != 0 {
        return Err(ConfigurationError::job_source("unexpected end of job file"));
    }
    Ok(parser.jobs)
}
