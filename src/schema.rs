//! Object schema used to validate subscription queries locally.
//!
//! Only names matter here: which object types exist and which properties
//! they expose. Property lookups go through a per-type index built once
//! when the type is registered.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One object type and its property names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub properties: Vec<String>,
    #[serde(skip)]
    index: HashSet<String>,
}

impl ObjectSchema {
    pub fn new<I, S>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let properties: Vec<String> = properties.into_iter().map(Into::into).collect();
        let index = properties.iter().cloned().collect();
        Self {
            name: name.into(),
            properties,
            index,
        }
    }

    pub fn has_property(&self, property: &str) -> bool {
        if self.index.is_empty() && !self.properties.is_empty() {
            // Deserialized without the index.
            return self.properties.iter().any(|p| p == property);
        }
        self.index.contains(property)
    }
}

/// All object types known to a realm.
///
/// An empty schema disables local type and property checks.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    objects: Vec<ObjectSchema>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an object type.
    pub fn with_object(mut self, object: ObjectSchema) -> Self {
        self.insert(object);
        self
    }

    pub fn insert(&mut self, object: ObjectSchema) {
        match self.by_name.get(&object.name) {
            Some(&slot) => self.objects[slot] = object,
            None => {
                self.by_name.insert(object.name.clone(), self.objects.len());
                self.objects.push(object);
            }
        }
    }

    /// Build from JSON: `[{"name": "Cat", "properties": ["name", "age"]}]`.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let objects: Vec<ObjectSchema> = serde_json::from_str(json)?;
        let mut schema = Schema::new();
        for object in objects {
            schema.insert(ObjectSchema::new(object.name, object.properties));
        }
        Ok(schema)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectSchema> {
        self.by_name.get(name).map(|&slot| &self.objects[slot])
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object_types(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.name.as_str())
    }
}
