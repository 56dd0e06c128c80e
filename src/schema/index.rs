// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;

use crate::schema::{EggKind, FieldKind, Fidelity, Schema, TypeDecl};

/// Storage name of a nested egg: `"<nest>.<egg>"`.
pub fn nested_field_name(nest: &str, egg: &str) -> String {
    format!("{}.{}", nest, egg)
}

/// A node field (or node egg) with its resolved target and fidelity.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkField {
    pub name: String,
    pub target: String,
    pub fidelity: Fidelity,
}

/// A connection field with its resolved element type and fidelity.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionField {
    pub name: String,
    pub element: String,
    pub fidelity: Fidelity,
}

/// A nested field with its eggs split by kind.
///
/// Egg names are the bare names; their storage names are derived with
/// [`nested_field_name`].
#[derive(Debug, Clone, PartialEq)]
pub struct NestedField {
    pub name: String,
    pub primitive_eggs: Vec<String>,
    pub node_eggs: Vec<LinkField>,
}

/// Per-object-type field lists derived from the schema.
///
/// All lists are ordered by field name, matching the schema's canonical
/// order, so every iteration over them is deterministic.
#[derive(Debug, Clone)]
pub struct ObjectIndex {
    /// Plain primitive and enum fields.
    pub primitives: Vec<String>,

    /// Plain node fields.
    pub links: Vec<LinkField>,

    /// Connection fields.
    pub connections: Vec<ConnectionField>,

    /// Nested fields with their eggs.
    pub nested: Vec<NestedField>,
}

impl ObjectIndex {
    /// All field names under which this type stores rows in `primitives`:
    /// plain primitives, nested-presence indicators (under the nest's own
    /// name) and nested primitive eggs (under their compound names).
    pub fn storage_primitive_fields(&self) -> Vec<String> {
        let mut fields = self.primitives.clone();
        for nest in &self.nested {
            fields.push(nest.name.clone());
            for egg in &nest.primitive_eggs {
                fields.push(nested_field_name(&nest.name, egg));
            }
        }
        fields
    }

    /// All field names under which this type stores rows in `links`: plain
    /// node fields and nested node eggs (under their compound names).
    pub fn storage_link_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.links.iter().map(|link| link.name.clone()).collect();
        for nest in &self.nested {
            for egg in &nest.node_eggs {
                fields.push(nested_field_name(&nest.name, &egg.name));
            }
        }
        fields
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionField> {
        self.connections.iter().find(|c| c.name == name)
    }

    pub fn nested_field(&self, name: &str) -> Option<&NestedField> {
        self.nested.iter().find(|n| n.name == name)
    }

    /// Whether the given storage field name is a nested-presence indicator.
    pub fn is_nested(&self, name: &str) -> bool {
        self.nested.iter().any(|n| n.name == name)
    }
}

/// Cache of [`ObjectIndex`] values for every object type in a schema.
///
/// Built once when a mirror is constructed and shared by the planner, the
/// ingestor and the extractor.
#[derive(Debug, Clone)]
pub struct SchemaIndex {
    objects: BTreeMap<String, ObjectIndex>,
}

impl SchemaIndex {
    pub fn new(schema: &Schema) -> Self {
        let mut objects = BTreeMap::new();

        for (typename, decl) in schema.types() {
            let fields = match decl {
                TypeDecl::Object { fields } => fields,
                _ => continue,
            };

            let mut index = ObjectIndex {
                primitives: Vec::new(),
                links: Vec::new(),
                connections: Vec::new(),
                nested: Vec::new(),
            };

            for (name, kind) in fields {
                match kind {
                    FieldKind::Id => (),
                    FieldKind::Primitive { .. } | FieldKind::Enum { .. } => {
                        index.primitives.push(name.clone());
                    }
                    FieldKind::Node { target, fidelity } => {
                        index.links.push(LinkField {
                            name: name.clone(),
                            target: target.clone(),
                            fidelity: *fidelity,
                        });
                    }
                    FieldKind::Connection { element, fidelity } => {
                        index.connections.push(ConnectionField {
                            name: name.clone(),
                            element: element.clone(),
                            fidelity: *fidelity,
                        });
                    }
                    FieldKind::Nested { fields: eggs } => {
                        let mut nest = NestedField {
                            name: name.clone(),
                            primitive_eggs: Vec::new(),
                            node_eggs: Vec::new(),
                        };
                        for (egg, kind) in eggs {
                            match kind {
                                EggKind::Primitive { .. } => {
                                    nest.primitive_eggs.push(egg.clone());
                                }
                                EggKind::Node { target, fidelity } => {
                                    nest.node_eggs.push(LinkField {
                                        name: egg.clone(),
                                        target: target.clone(),
                                        fidelity: *fidelity,
                                    });
                                }
                            }
                        }
                        index.nested.push(nest);
                    }
                }
            }

            objects.insert(typename.clone(), index);
        }

        Self { objects }
    }

    pub fn object(&self, typename: &str) -> Option<&ObjectIndex> {
        self.objects.get(typename)
    }

    /// Typenames of all object types, in canonical order.
    pub fn typenames(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}
