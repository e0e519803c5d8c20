use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::{EdgeTypeId, LabelId, PropertyId};

#[derive(Default)]
struct NameMap {
    name_to_id: HashMap<String, u32>,
    id_to_name: Vec<String>,
}

impl NameMap {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.name_to_id.get(name) {
            return *id;
        }
        let id = self.id_to_name.len() as u32;
        self.id_to_name.push(name.to_owned());
        self.name_to_id.insert(name.to_owned(), id);
        id
    }

    fn name(&self, id: u32) -> Option<&str> {
        self.id_to_name.get(id as usize).map(String::as_str)
    }
}

/// Bidirectional mapping between human-readable names and dense integer
/// ids for labels, properties, and edge types. Ids are never reused;
/// interning is idempotent.
#[derive(Default)]
pub struct NameStore {
    labels: RwLock<NameMap>,
    properties: RwLock<NameMap>,
    edge_types: RwLock<NameMap>,
}

impl NameStore {
    pub fn name_to_label(&self, name: &str) -> LabelId {
        LabelId(intern(&self.labels, name))
    }

    pub fn name_to_property(&self, name: &str) -> PropertyId {
        PropertyId(intern(&self.properties, name))
    }

    pub fn name_to_edge_type(&self, name: &str) -> EdgeTypeId {
        EdgeTypeId(intern(&self.edge_types, name))
    }

    pub fn label_to_name(&self, label: LabelId) -> Result<String> {
        lookup(&self.labels, label.0)
    }

    pub fn property_to_name(&self, property: PropertyId) -> Result<String> {
        lookup(&self.properties, property.0)
    }

    pub fn edge_type_to_name(&self, edge_type: EdgeTypeId) -> Result<String> {
        lookup(&self.edge_types, edge_type.0)
    }
}

fn intern(map: &RwLock<NameMap>, name: &str) -> u32 {
    if let Some(id) = map.read().name_to_id.get(name) {
        return *id;
    }
    map.write().intern(name)
}

fn lookup(map: &RwLock<NameMap>, id: u32) -> Result<String> {
    map.read().name(id).map(str::to_owned).ok_or(Error::UnknownId)
}
