use crate::flatten::{FlatRecord, ReferenceRecord};
use crate::mapper::MappedRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Headline numbers for one profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Parents with at least one child
    pub total_parents: usize,
    pub total_children: usize,
    /// Distinct value count per summary field
    pub distinct: BTreeMap<String, usize>,
    pub total_references: usize,
    /// Reference count per value of the reference group field
    pub reference_groups: BTreeMap<String, usize>,
}

/// Inclusive date range; an open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

pub fn summarize(
    records: &[FlatRecord],
    summary_fields: &[String],
    references: &[ReferenceRecord],
    group_field: Option<&str>,
) -> Summary {
    let parents: BTreeSet<&str> = records.iter().map(|r| r.parent_id.as_str()).collect();

    let distinct = summary_fields
        .iter()
        .map(|field| {
            // Keyed by kind too, so `1` and `"1"` stay distinct
            let values: BTreeSet<(&str, String)> = records
                .iter()
                .filter_map(|r| r.get(field))
                .map(|v| (v.kind(), v.to_string()))
                .collect();
            (field.clone(), values.len())
        })
        .collect();

    let reference_groups = match group_field {
        Some(field) => tally(references.iter().filter_map(|r| r.fields.get(field))),
        None => BTreeMap::new(),
    };

    Summary {
        total_parents: parents.len(),
        total_children: records.len(),
        distinct,
        total_references: references.len(),
        reference_groups,
    }
}

/// Number of flattened records per value of `field`; records without the
/// field are not counted.
pub fn count_by(records: &[FlatRecord], field: &str) -> BTreeMap<String, usize> {
    tally(records.iter().filter_map(|r| r.get(field)))
}

/// Keep mapped records whose `date_field` falls inside `range`. Records with
/// no parsed date are excluded rather than treated as errors.
pub fn filter_by_date_range(
    records: Vec<MappedRecord>,
    date_field: &str,
    range: &DateRange,
) -> Vec<MappedRecord> {
    records
        .into_iter()
        .filter(|r| {
            r.get(date_field)
                .and_then(|v| v.as_date())
                .map_or(false, |d| range.contains(d))
        })
        .collect()
}

/// Buckets are keyed by display text, so values of different kinds that
/// render alike (`1` and `"1"`) share a bucket.
fn tally<'a, T>(values: impl Iterator<Item = &'a T>) -> BTreeMap<String, usize>
where
    T: ToString + 'a,
{
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}
