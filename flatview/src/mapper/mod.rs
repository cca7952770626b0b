use crate::error::{FlatViewError, Result};
use crate::flatten::FlatRecord;
use crate::value::{FieldValue, Fields};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// The date format used when a profile does not name one (`dd-mm-yyyy`).
pub const DEFAULT_DATE_FORMAT: &str = "%d-%m-%Y";

/// Raw field name to display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenameTable(BTreeMap<String, String>);

impl RenameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raw: &str, display: &str) -> &mut Self {
        self.0.insert(raw.to_string(), display.to_string());
        self
    }

    /// Display name for a raw field; unmapped names pass through.
    pub fn display_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.0.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenameTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RenameTable(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Designates one raw field as a date and the format it is written in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateSpec {
    pub field: String,
    #[serde(default = "default_date_format")]
    pub format: String,
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl DateSpec {
    pub fn new(field: &str) -> Self {
        DateSpec {
            field: field.to_string(),
            format: default_date_format(),
        }
    }

    pub fn with_format(field: &str, format: &str) -> Self {
        DateSpec {
            field: field.to_string(),
            format: format.to_string(),
        }
    }

    /// Reject formats chrono cannot interpret, and formats that can never
    /// yield a full calendar date (e.g. `%H` or `%m-%d`).
    pub fn check(&self) -> Result<()> {
        let invalid = |why: &str| {
            FlatViewError::Parse(format!(
                "Invalid date format '{}' for field '{}': {why}",
                self.format, self.field
            ))
        };

        if StrftimeItems::new(&self.format).any(|item| matches!(item, Item::Error)) {
            return Err(invalid("unknown specifier"));
        }

        // Render a known date and read it back
        let sample =
            NaiveDate::from_ymd_opt(2024, 3, 9).ok_or_else(|| invalid("no sample date"))?;
        let mut rendered = String::new();
        write!(rendered, "{}", sample.format(&self.format))
            .map_err(|_| invalid("uses fields a date does not have"))?;
        match NaiveDate::parse_from_str(&rendered, &self.format) {
            Ok(date) if date == sample => Ok(()),
            _ => Err(invalid("does not identify a calendar date")),
        }
    }

    /// Parse a stored value into a date. Anything unparseable is `None`.
    pub fn parse(&self, value: &FieldValue) -> Option<NaiveDate> {
        match value {
            FieldValue::String(s) => match NaiveDate::parse_from_str(s.trim(), &self.format) {
                Ok(date) => Some(date),
                Err(e) => {
                    log::debug!("Field '{}': cannot parse '{}' as date: {}", self.field, s, e);
                    None
                }
            },
            FieldValue::Timestamp(ts) => Some(ts.date_naive()),
            FieldValue::Number(_) | FieldValue::Bool(_) => None,
        }
    }
}

/// A value of a mapped record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MappedValue {
    Value(FieldValue),
    /// The designated date field; `None` when it could not be parsed.
    Date(Option<NaiveDate>),
}

impl MappedValue {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            MappedValue::Date(date) => *date,
            MappedValue::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&FieldValue> {
        match self {
            MappedValue::Value(v) => Some(v),
            MappedValue::Date(_) => None,
        }
    }
}

/// A record keyed by display names.
pub type MappedRecord = BTreeMap<String, MappedValue>;

/// Rename a record's fields and parse its designated date field.
///
/// Never fails: a date that does not parse becomes `Date(None)`, which
/// downstream date-range filters treat as "no date".
pub fn map_fields(record: &Fields, renames: &RenameTable, date: Option<&DateSpec>) -> MappedRecord {
    record
        .iter()
        .map(|(raw, value)| {
            let mapped = match date {
                Some(spec) if spec.field == *raw => MappedValue::Date(spec.parse(value)),
                _ => MappedValue::Value(value.clone()),
            };
            (renames.display_name(raw).to_string(), mapped)
        })
        .collect()
}

/// Map every flattened record, including its `parent_id`/`child_id` keys.
pub fn map_records(
    records: &[FlatRecord],
    renames: &RenameTable,
    date: Option<&DateSpec>,
) -> Vec<MappedRecord> {
    records
        .iter()
        .map(|r| map_fields(&r.to_fields(), renames, date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::fields;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn health_renames() -> RenameTable {
        [
            ("name", "Patient Name"),
            ("visitDate", "Date of Visit"),
            ("symptoms", "Reported Symptoms"),
            ("location", "District"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_renames_and_passthrough() {
        let record = fields([("name", "Asha"), ("ward", "B2")]);
        let mapped = map_fields(&record, &health_renames(), None);

        assert_eq!(
            mapped["Patient Name"],
            MappedValue::Value(FieldValue::from("Asha"))
        );
        assert_eq!(mapped["ward"], MappedValue::Value(FieldValue::from("B2")));
        assert!(!mapped.contains_key("name"));
    }

    #[test]
    fn test_parses_designated_date() {
        let record = fields([("visitDate", "05-01-2024")]);
        let spec = DateSpec::new("visitDate");
        let mapped = map_fields(&record, &health_renames(), Some(&spec));

        assert_eq!(
            mapped["Date of Visit"].as_date(),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn test_bad_date_degrades_to_none() {
        let spec = DateSpec::new("visitDate");
        for bad in ["2024-01-05", "31-02-2024", "yesterday", ""] {
            let record = fields([("visitDate", bad)]);
            let mapped = map_fields(&record, &health_renames(), Some(&spec));
            assert_eq!(mapped["Date of Visit"], MappedValue::Date(None), "input {bad:?}");
        }
    }

    #[test]
    fn test_non_string_dates() {
        let spec = DateSpec::new("visitDate");
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();

        let mut record = Fields::new();
        record.insert("visitDate".into(), FieldValue::Timestamp(ts));
        let mapped = map_fields(&record, &RenameTable::new(), Some(&spec));
        assert_eq!(mapped["visitDate"].as_date(), NaiveDate::from_ymd_opt(2024, 3, 9));

        record.insert("visitDate".into(), FieldValue::Number(20240309.0));
        let mapped = map_fields(&record, &RenameTable::new(), Some(&spec));
        assert_eq!(mapped["visitDate"], MappedValue::Date(None));
    }

    #[test]
    fn test_absent_date_field_stays_absent() {
        let record = fields([("name", "Asha")]);
        let spec = DateSpec::new("visitDate");
        let mapped = map_fields(&record, &health_renames(), Some(&spec));
        assert!(!mapped.contains_key("Date of Visit"));
    }

    #[test]
    fn test_deterministic() {
        let record = fields([("name", "Asha"), ("visitDate", "05-01-2024")]);
        let spec = DateSpec::new("visitDate");
        let a = map_fields(&record, &health_renames(), Some(&spec));
        let b = map_fields(&record, &health_renames(), Some(&spec));
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_format() {
        let spec = DateSpec::with_format("sessionDate", "%Y/%m/%d");
        assert!(spec.check().is_ok());
        assert_eq!(
            spec.parse(&FieldValue::from("2024/06/30")),
            NaiveDate::from_ymd_opt(2024, 6, 30)
        );
    }

    #[test]
    fn test_check_rejects_bad_format() {
        let spec = DateSpec::with_format("visitDate", "%d-%!");
        assert!(spec.check().is_err());
    }

    #[test]
    fn test_check_rejects_formats_without_a_date() {
        for format in ["%H", "%H:%M", "%m-%d", "%Y"] {
            let spec = DateSpec::with_format("visitDate", format);
            assert!(spec.check().is_err(), "format {format:?}");
        }
        assert!(DateSpec::new("visitDate").check().is_ok());
        assert!(DateSpec::with_format("visitDate", "%Y-%j").check().is_ok());
    }

    #[test]
    fn test_serializes_dates_and_nulls() {
        let record = fields([("visitDate", "05-01-2024"), ("name", "Asha")]);
        let spec = DateSpec::new("visitDate");
        let mapped = map_fields(&record, &health_renames(), Some(&spec));
        let json = serde_json::to_value(&mapped).unwrap();
        assert_eq!(json["Date of Visit"], "2024-01-05");
        assert_eq!(json["Patient Name"], "Asha");

        let broken = map_fields(&fields([("visitDate", "soon")]), &health_renames(), Some(&spec));
        assert!(serde_json::to_value(&broken).unwrap()["Date of Visit"].is_null());
    }
}
