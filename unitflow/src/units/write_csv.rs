//! Writes a list found in the context to a CSV file.

use async_trait::async_trait;
use chrono::Timelike;
use std::io::Write;

use super::{element_context, Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::{Context, Value, DATETIME_FORMAT};
use crate::errors::UnitError;
use crate::template::expand_placeholders;

/// Writes one line per element of the list at `path` to `outfile`, holding
/// the values of the comma-separated `fields`. Passes the input through.
///
/// No header line is written. Values containing the delimiter, a quote or a
/// line break are quoted with inner quotes doubled. A row whose only field
/// is empty is written as an empty line.
#[derive(Debug)]
pub struct WriteCsv {
    config: UnitConfig,
}

impl WriteCsv {
    /// Creates the unit.
    #[must_use]
    pub const fn new(config: UnitConfig) -> Self {
        Self { config }
    }
}

fn render_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::DateTime(dt)) if dt.num_seconds_from_midnight() == 0 => {
            dt.format("%Y-%m-%d").to_string()
        }
        Some(Value::DateTime(dt)) => dt.format(DATETIME_FORMAT).to_string(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl Unit for WriteCsv {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        _env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let fields = self.config.list("fields");
        if fields.is_empty() {
            return Err(UnitError::invalid_config("missing attribute 'fields'"));
        }
        let path = self.config.require("path")?;
        let outfile = expand_placeholders(self.config.require("outfile")?, &input);
        let outfile = outfile.trim();

        let Some(rows) = input.select_values(path) else {
            tracing::debug!(unit = self.config.label(), path, "No list at path, nothing written");
            return Ok(UnitOutcome::emit(input));
        };

        let file = std::fs::File::create(outfile)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&file);
        for row in &rows {
            let row = element_context(row.clone());
            let record: Vec<String> = fields
                .iter()
                .map(|field| render_field(row.get_path(field)))
                .collect();
            if let [only] = record.as_slice() {
                if only.is_empty() {
                    // csv writes a lone empty field as `""`.
                    writer.flush()?;
                    (&file).write_all(b"\n")?;
                    continue;
                }
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;

        tracing::info!(unit = self.config.label(), outfile, rows = rows.len(), "CSV written");
        Ok(UnitOutcome::emit(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn unit(outfile: &str) -> WriteCsv {
        WriteCsv::new(UnitConfig::new(
            "WriteCSV",
            [("fields", "a, b"), ("path", "rows"), ("outfile", outfile)],
            "",
        ))
    }

    #[test]
    fn test_render_field_dates() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let afternoon = midnight.with_hour(14).unwrap();

        assert_eq!(render_field(Some(&Value::from(midnight))), "2024-03-01");
        assert_eq!(render_field(Some(&Value::from(afternoon))), "2024-03-01 14:00:00");
        assert_eq!(render_field(Some(&Value::Null)), "");
        assert_eq!(render_field(None), "");
    }

    #[tokio::test]
    async fn test_writes_rows_with_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let outfile = format!("{}/out-@day.csv", dir.path().display());
        let input = Context::from_json(serde_json::json!({
            "day": "mon",
            "rows": [
                {"a": 1, "b": "x,y"},
                {"a": 2, "b": "say \"hi\""},
                {"a": 3}
            ]
        }))
        .unwrap();
        let mut test_env = TestEnv::new();

        let outcome = unit(&outfile)
            .execute(input.clone(), &mut test_env.env())
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::emit(input));
        let written = std::fs::read_to_string(dir.path().join("out-mon.csv")).unwrap();
        assert_eq!(written, "1,\"x,y\"\n2,\"say \"\"hi\"\"\"\n3,\n");
    }

    #[tokio::test]
    async fn test_single_field_is_quoted_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let outfile = dir.path().join("single.csv");
        let outfile_name = outfile.display().to_string();
        let mut unit = WriteCsv::new(UnitConfig::new(
            "WriteCSV",
            [
                ("fields", "a"),
                ("path", "rows"),
                ("outfile", outfile_name.as_str()),
            ],
            "",
        ));
        let input = Context::from_json(serde_json::json!({
            "rows": [{"a": ""}, {"a": " lead"}, {"a": "#x"}, {"b": 1}, {"a": "p,q"}]
        }))
        .unwrap();
        let mut test_env = TestEnv::new();

        unit.execute(input, &mut test_env.env()).await.unwrap();

        let written = std::fs::read_to_string(&outfile).unwrap();
        assert_eq!(written, "\n lead\n#x\n\n\"p,q\"\n");
    }

    #[tokio::test]
    async fn test_missing_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let outfile = dir.path().join("out.csv");
        let mut test_env = TestEnv::new();

        unit(&outfile.display().to_string())
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap();
        assert!(!outfile.exists());
    }

    #[tokio::test]
    async fn test_fields_are_required() {
        let mut unit = WriteCsv::new(UnitConfig::new(
            "WriteCSV",
            [("path", "rows"), ("outfile", "x.csv")],
            "",
        ));
        let mut test_env = TestEnv::new();
        let err = unit.execute(Context::new(), &mut test_env.env()).await.unwrap_err();
        assert!(matches!(err, UnitError::InvalidConfig(_)));
    }
}
