use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{LabelId, PropertyId};
use crate::value::PropertyValue;

use super::transaction::TransactionEngine;
use super::vertex::VertexChain;

pub(crate) mod label;
pub(crate) mod label_property;

pub use self::label::LabelVerticesIter;
pub use self::label_property::LabelPropertyVerticesIter;

use self::label::LabelIndex;
use self::label_property::LabelPropertyIndex;

/// Registered indexes, as reported by `Storage::list_all_indices`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndicesInfo {
    pub label: Vec<LabelId>,
    pub label_property: Vec<(LabelId, PropertyId)>,
}

/// All secondary indexes plus the write-path hooks that keep them fed.
pub(crate) struct Indices {
    pub(crate) label: LabelIndex,
    pub(crate) label_property: LabelPropertyIndex,
}

impl Indices {
    pub(crate) fn new() -> Self {
        Indices {
            label: LabelIndex::new(),
            label_property: LabelPropertyIndex::new(),
        }
    }

    /// Called after a label is added to a vertex: records the label entry
    /// and, for every `(label, property)` index on this label, the entry
    /// for the property value the vertex already holds.
    pub(crate) fn update_on_add_label(
        &self,
        label: LabelId,
        chain: &Arc<VertexChain>,
        properties: &BTreeMap<PropertyId, PropertyValue>,
        tid: u64,
    ) {
        self.label.insert(label, chain, tid);
        for property in self.label_property.properties_for_label(label) {
            if let Some(value) = properties.get(&property) {
                if !value.is_null() {
                    self.label_property
                        .insert(label, property, value.clone(), chain, tid);
                }
            }
        }
    }

    /// Called after a non-null property write: records entries for every
    /// `(label, property)` index whose label the vertex carries.
    pub(crate) fn update_on_set_property(
        &self,
        property: PropertyId,
        value: &PropertyValue,
        chain: &Arc<VertexChain>,
        labels: &[LabelId],
        tid: u64,
    ) {
        for label in self.label_property.labels_for_property(property) {
            if labels.contains(&label) {
                self.label_property
                    .insert(label, property, value.clone(), chain, tid);
            }
        }
    }

    pub(crate) fn info(&self) -> IndicesInfo {
        let mut label = self.label.labels();
        label.sort();
        IndicesInfo {
            label,
            label_property: self.label_property.list(),
        }
    }

    /// Returns `(label_entries_removed, label_property_entries_removed)`.
    pub(crate) fn collect_garbage(&self, engine: &TransactionEngine, horizon: u64) -> (u64, u64) {
        (
            self.label.collect_garbage(engine, horizon),
            self.label_property.collect_garbage(engine, horizon),
        )
    }
}
