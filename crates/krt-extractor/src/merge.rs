//! Deduplicator/Merger
//!
//! Rows sharing `(resource type, identifier)` collapse into the first one
//! seen. Later duplicates only contribute their additional information.
//! Rows without an identifier are never merged, since different unnamed
//! resources would otherwise collapse into one.

use std::collections::HashMap;

use krt_core::{ResourceRow, ResourceType};

/// Joins distinct additional-information values of merged rows
pub const INFO_SEPARATOR: &str = "; ";

pub fn merge_rows(rows: impl IntoIterator<Item = ResourceRow>) -> Vec<ResourceRow> {
    let mut merged: Vec<ResourceRow> = Vec::new();
    let mut infos: Vec<Vec<String>> = Vec::new();
    let mut index: HashMap<(ResourceType, String), usize> = HashMap::new();

    for row in rows {
        let info = row.additional_info.trim().to_string();

        if row.has_identifier() {
            let key = (row.resource_type, row.identifier.clone());
            if let Some(&position) = index.get(&key) {
                let existing = &mut infos[position];
                if !info.is_empty() && !existing.contains(&info) {
                    existing.push(info);
                }
                continue;
            }
            index.insert(key, merged.len());
        }

        infos.push(if info.is_empty() { Vec::new() } else { vec![info] });
        merged.push(row);
    }

    for (row, parts) in merged.iter_mut().zip(infos) {
        row.additional_info = parts.join(INFO_SEPARATOR);
    }

    tracing::trace!(rows = merged.len(), "Merged rows");
    merged
}
