//! Dashboard statistics. Pure functions over already-fetched records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use ecoyard_core::parse_rfc3339;

use crate::model::{ItemStatus, MaterialBatch, RecyclingItem, StageStatus};

/// A record the reporting functions can aggregate.
pub trait Reportable {
    /// Every status label the record kind can carry, in display order.
    fn status_labels() -> &'static [&'static str]
    where
        Self: Sized;

    fn status_label(&self) -> &'static str;

    fn material_type(&self) -> &str;

    /// Quantity text with a numeric kilogram prefix.
    fn quantity(&self) -> &str;

    /// Whether the record counts towards the recycling rate.
    fn is_recycled(&self) -> bool;

    /// Date used for recency ordering.
    fn date(&self) -> Option<DateTime<Utc>>;
}

impl Reportable for MaterialBatch {
    fn status_labels() -> &'static [&'static str] {
        &["Pending", "In Progress", "Completed"]
    }

    fn status_label(&self) -> &'static str {
        self.overall_status.label()
    }

    fn material_type(&self) -> &str {
        &self.material_type
    }

    fn quantity(&self) -> &str {
        &self.quantity
    }

    fn is_recycled(&self) -> bool {
        self.overall_status == StageStatus::Completed
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.last_updated
            .as_deref()
            .or(self.created_at.as_deref())
            .and_then(parse_rfc3339)
    }
}

impl Reportable for RecyclingItem {
    fn status_labels() -> &'static [&'static str] {
        &ItemStatus::LABELS
    }

    fn status_label(&self) -> &'static str {
        self.status.label()
    }

    fn material_type(&self) -> &str {
        &self.material_type
    }

    fn quantity(&self) -> &str {
        &self.quantity
    }

    fn is_recycled(&self) -> bool {
        self.status == ItemStatus::Recycled
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(parse_rfc3339)
    }
}

/// Count per status label. Every label is present, zero if unused.
pub fn count_by_status<T: Reportable>(records: &[T]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> =
        T::status_labels().iter().map(|label| (*label, 0)).collect();
    for record in records {
        *counts.entry(record.status_label()).or_insert(0) += 1;
    }
    counts
}

/// Leading number of a quantity string: `"10 kg"` → 10, `"bad"` → 0.
///
/// Accepts leading whitespace, an optional sign and a decimal fraction,
/// and ignores everything after the number.
pub fn parse_weight(quantity: &str) -> f64 {
    let s = quantity.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if frac_end > frac_start || end > digits_start {
            end = frac_end;
        }
    }
    if digits == 0 {
        return 0.0;
    }

    s[..end]
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .unwrap_or(0.0)
}

/// Sum of every record's weight in kilograms.
pub fn total_weight<T: Reportable>(records: &[T]) -> f64 {
    records.iter().map(|r| parse_weight(r.quantity())).sum()
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * part as f64 / total as f64).round() as u32
}

/// Share of recycled records, as a rounded percentage. 0 for no records.
pub fn recycling_rate<T: Reportable>(records: &[T]) -> u32 {
    let recycled = records.iter().filter(|r| r.is_recycled()).count();
    percent(recycled, records.len())
}

/// Count and rounded percentage for one material type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialShare {
    #[serde(rename = "type")]
    pub material_type: String,
    pub count: usize,
    pub percentage: u32,
}

/// Per-type counts in first-seen order.
pub fn material_distribution<T: Reportable>(records: &[T]) -> Vec<MaterialShare> {
    let mut shares: Vec<MaterialShare> = Vec::new();
    for record in records {
        match shares
            .iter_mut()
            .find(|s| s.material_type == record.material_type())
        {
            Some(share) => share.count += 1,
            None => shares.push(MaterialShare {
                material_type: record.material_type().to_string(),
                count: 1,
                percentage: 0,
            }),
        }
    }
    let total = records.len();
    for share in &mut shares {
        share.percentage = percent(share.count, total);
    }
    shares
}

/// The `n` most recent records, newest first.
///
/// The sort is stable, so records with equal dates keep their input order.
/// Records without a usable date go last.
pub fn recent_items<T: Reportable + Clone>(records: &[T], n: usize) -> Vec<T> {
    let mut sorted: Vec<T> = records.to_vec();
    sorted.sort_by(|a, b| b.date().cmp(&a.date()));
    sorted.truncate(n);
    sorted
}

/// Mean days from creation to completion over completed batches.
///
/// Batches without both timestamps are ignored; with none left the result
/// is 0 rather than "unavailable".
pub fn average_processing_days(batches: &[MaterialBatch]) -> f64 {
    let durations: Vec<f64> = batches
        .iter()
        .filter_map(|b| {
            let start = parse_rfc3339(b.created_at.as_deref()?)?;
            let end = parse_rfc3339(b.completed_at.as_deref()?)?;
            let secs = (end - start).num_seconds();
            (secs >= 0).then(|| secs as f64 / 86_400.0)
        })
        .collect();

    if durations.is_empty() {
        return 0.0;
    }
    durations.iter().sum::<f64>() / durations.len() as f64
}

/// Everything the reporting view shows, in one payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub batch_count: usize,
    pub batches_by_status: BTreeMap<&'static str, usize>,
    pub batch_weight_kg: f64,
    pub completion_rate: u32,
    pub average_processing_days: f64,
    pub item_count: usize,
    pub items_by_status: BTreeMap<&'static str, usize>,
    pub item_weight_kg: f64,
    pub recycling_rate: u32,
    pub material_distribution: Vec<MaterialShare>,
    pub recent_items: Vec<RecyclingItem>,
}

pub const RECENT_ITEMS: usize = 5;

pub fn summary(batches: &[MaterialBatch], items: &[RecyclingItem]) -> ReportSummary {
    ReportSummary {
        batch_count: batches.len(),
        batches_by_status: count_by_status(batches),
        batch_weight_kg: total_weight(batches),
        completion_rate: recycling_rate(batches),
        average_processing_days: average_processing_days(batches),
        item_count: items.len(),
        items_by_status: count_by_status(items),
        item_weight_kg: total_weight(items),
        recycling_rate: recycling_rate(items),
        material_distribution: material_distribution(items),
        recent_items: recent_items(items, RECENT_ITEMS),
    }
}
