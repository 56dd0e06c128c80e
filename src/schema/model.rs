// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::schema::SchemaError;

/// Reserved name of the identifier field every object must declare.
pub const ID_FIELD_NAME: &str = "id";

/// Reserved introspection field name, never declarable by a schema.
pub const TYPENAME_FIELD_NAME: &str = "__typename";

/// Ground category of a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundType {
    String,
    Number,
    Boolean,
}

/// Whether a primitive field may hold null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Nullability {
    Nullable,
    NonNull,
}

/// Whether a reference delivers the concrete typename of its target.
///
/// Faithful references always return the target's typename alongside its
/// id. Unfaithful ones don't, so the target is registered without a
/// typename and resolved later through a dedicated typename query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    Faithful,
    Unfaithful,
}

/// Kind of a single field on an object type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// The object's identifier. Exactly one per object, named
    /// [`ID_FIELD_NAME`].
    Id,

    /// An opaque value of a declared scalar type.
    Primitive {
        scalar: String,
        nullable: Nullability,
    },

    /// A primitive with named discrete values.
    Enum { name: String, nullable: Nullability },

    /// A reference to a single object (or null). The target may be an
    /// object or a union type.
    Node { target: String, fidelity: Fidelity },

    /// A lazy, ordered, paginated collection of references to objects of
    /// the declared element type.
    Connection { element: String, fidelity: Fidelity },

    /// A single-level group of fields which may as a whole be null.
    Nested { fields: BTreeMap<String, EggKind> },
}

impl FieldKind {
    pub fn primitive(scalar: &str, nullable: Nullability) -> Self {
        FieldKind::Primitive {
            scalar: scalar.to_owned(),
            nullable,
        }
    }

    pub fn enum_(name: &str, nullable: Nullability) -> Self {
        FieldKind::Enum {
            name: name.to_owned(),
            nullable,
        }
    }

    pub fn node(target: &str, fidelity: Fidelity) -> Self {
        FieldKind::Node {
            target: target.to_owned(),
            fidelity,
        }
    }

    pub fn connection(element: &str, fidelity: Fidelity) -> Self {
        FieldKind::Connection {
            element: element.to_owned(),
            fidelity,
        }
    }

    pub fn nested(fields: Vec<(&str, EggKind)>) -> Self {
        FieldKind::Nested {
            fields: fields
                .into_iter()
                .map(|(name, kind)| (name.to_owned(), kind))
                .collect(),
        }
    }
}

/// Kind of a field inside a nested group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EggKind {
    Primitive {
        scalar: String,
        nullable: Nullability,
    },
    Node {
        target: String,
        fidelity: Fidelity,
    },
}

impl EggKind {
    pub fn primitive(scalar: &str, nullable: Nullability) -> Self {
        EggKind::Primitive {
            scalar: scalar.to_owned(),
            nullable,
        }
    }

    pub fn node(target: &str, fidelity: Fidelity) -> Self {
        EggKind::Node {
            target: target.to_owned(),
            fidelity,
        }
    }
}

/// Declaration of a single type in the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDecl {
    /// An object with typed fields.
    Object { fields: BTreeMap<String, FieldKind> },

    /// An unordered set of clauses, each a declared object typename.
    Union { clauses: BTreeSet<String> },

    /// A primitive-only type usable as the scalar of primitive fields. It
    /// cannot appear as a standalone node.
    Scalar { ground: GroundType },

    /// A primitive-only type with named discrete values.
    Enum { values: BTreeSet<String> },
}

/// Validated, immutable description of the universe of remote types.
///
/// Constructed through [`Schema::builder`] (or [`Schema::new`] from an
/// already-collected type map). All referential invariants are checked once
/// here so downstream components can index into the schema without
/// re-validating.
///
/// The `Serialize` implementation is canonical: all maps and sets are
/// ordered collections, so two schemas declaring the same types in a
/// different order serialise to identical JSON. The `meta` compatibility
/// gate relies on this.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    types: BTreeMap<String, TypeDecl>,
}

impl Schema {
    /// Validates the given type declarations and returns the schema.
    pub fn new(types: BTreeMap<String, TypeDecl>) -> Result<Self, SchemaError> {
        let schema = Self { types };
        schema.validate()?;
        Ok(schema)
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// All type declarations, ordered by typename.
    pub fn types(&self) -> &BTreeMap<String, TypeDecl> {
        &self.types
    }

    pub fn get(&self, typename: &str) -> Option<&TypeDecl> {
        self.types.get(typename)
    }

    /// Fields of the given object type, or `None` if the typename is not a
    /// declared object.
    pub fn object_fields(&self, typename: &str) -> Option<&BTreeMap<String, FieldKind>> {
        match self.types.get(typename) {
            Some(TypeDecl::Object { fields }) => Some(fields),
            _ => None,
        }
    }

    /// Clauses of the given union type, or `None` if the typename is not a
    /// declared union.
    pub fn union_clauses(&self, typename: &str) -> Option<&BTreeSet<String>> {
        match self.types.get(typename) {
            Some(TypeDecl::Union { clauses }) => Some(clauses),
            _ => None,
        }
    }

    pub fn is_object(&self, typename: &str) -> bool {
        matches!(self.types.get(typename), Some(TypeDecl::Object { .. }))
    }

    pub fn is_union(&self, typename: &str) -> bool {
        matches!(self.types.get(typename), Some(TypeDecl::Union { .. }))
    }

    /// Canonical JSON serialisation, stable with respect to declaration
    /// order.
    pub fn canonical_json(&self) -> String {
        // Serialisation of ordered maps over plain enums cannot fail.
        serde_json::to_string(self).expect("schema serialisation is infallible")
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for (typename, decl) in &self.types {
            match decl {
                TypeDecl::Object { fields } => self.validate_object(typename, fields)?,
                TypeDecl::Union { clauses } => {
                    for clause in clauses {
                        match self.types.get(clause) {
                            Some(TypeDecl::Object { .. }) => (),
                            Some(_) => {
                                return Err(SchemaError::WrongKind {
                                    typename: typename.clone(),
                                    target: clause.clone(),
                                    expected: "an object clause",
                                })
                            }
                            None => {
                                return Err(SchemaError::UnknownType {
                                    typename: typename.clone(),
                                    target: clause.clone(),
                                })
                            }
                        }
                    }
                }
                TypeDecl::Scalar { .. } | TypeDecl::Enum { .. } => (),
            }
        }

        Ok(())
    }

    fn validate_object(
        &self,
        typename: &str,
        fields: &BTreeMap<String, FieldKind>,
    ) -> Result<(), SchemaError> {
        let mut id_fields = 0;

        for (field, kind) in fields {
            if field == TYPENAME_FIELD_NAME {
                return Err(SchemaError::ReservedFieldName {
                    typename: typename.to_owned(),
                    field: field.clone(),
                });
            }

            if field.contains('.') || field.is_empty() {
                return Err(SchemaError::InvalidFieldName {
                    typename: typename.to_owned(),
                    field: field.clone(),
                });
            }

            match kind {
                FieldKind::Id => {
                    if field != ID_FIELD_NAME {
                        return Err(SchemaError::BadIdField(typename.to_owned()));
                    }
                    id_fields += 1;
                }
                FieldKind::Primitive { scalar, .. } => {
                    self.expect_kind(typename, scalar, Expected::Scalar)?;
                }
                FieldKind::Enum { name, .. } => {
                    self.expect_kind(typename, name, Expected::Enum)?;
                }
                FieldKind::Node { target, .. } | FieldKind::Connection { element: target, .. } => {
                    self.expect_kind(typename, target, Expected::ObjectOrUnion)?;
                }
                FieldKind::Nested { fields: eggs } => {
                    for (egg, kind) in eggs {
                        if egg == TYPENAME_FIELD_NAME {
                            return Err(SchemaError::ReservedFieldName {
                                typename: typename.to_owned(),
                                field: format!("{}.{}", field, egg),
                            });
                        }
                        if egg.contains('.') || egg.is_empty() {
                            return Err(SchemaError::InvalidFieldName {
                                typename: typename.to_owned(),
                                field: format!("{}.{}", field, egg),
                            });
                        }
                        match kind {
                            EggKind::Primitive { scalar, .. } => {
                                self.expect_kind(typename, scalar, Expected::Scalar)?;
                            }
                            EggKind::Node { target, .. } => {
                                self.expect_kind(typename, target, Expected::ObjectOrUnion)?;
                            }
                        }
                    }
                }
            }
        }

        if id_fields != 1 {
            return Err(SchemaError::BadIdField(typename.to_owned()));
        }

        Ok(())
    }

    fn expect_kind(
        &self,
        typename: &str,
        target: &str,
        expected: Expected,
    ) -> Result<(), SchemaError> {
        let decl = self.types.get(target).ok_or_else(|| SchemaError::UnknownType {
            typename: typename.to_owned(),
            target: target.to_owned(),
        })?;

        let matches = match expected {
            Expected::Scalar => matches!(decl, TypeDecl::Scalar { .. }),
            Expected::Enum => matches!(decl, TypeDecl::Enum { .. }),
            Expected::ObjectOrUnion => {
                matches!(decl, TypeDecl::Object { .. } | TypeDecl::Union { .. })
            }
        };

        if matches {
            Ok(())
        } else {
            Err(SchemaError::WrongKind {
                typename: typename.to_owned(),
                target: target.to_owned(),
                expected: expected.description(),
            })
        }
    }
}

#[derive(Clone, Copy)]
enum Expected {
    Scalar,
    Enum,
    ObjectOrUnion,
}

impl Expected {
    fn description(self) -> &'static str {
        match self {
            Expected::Scalar => "a scalar",
            Expected::Enum => "an enum",
            Expected::ObjectOrUnion => "an object or union",
        }
    }
}

/// Collects type declarations and validates them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: BTreeMap<String, TypeDecl>,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    pub fn object(self, typename: &str, fields: Vec<(&str, FieldKind)>) -> Self {
        let mut collected = BTreeMap::new();
        for (name, kind) in fields {
            if collected.insert(name.to_owned(), kind).is_some() {
                return self.fail(SchemaError::DuplicateField {
                    typename: typename.to_owned(),
                    field: name.to_owned(),
                });
            }
        }
        self.declare(typename, TypeDecl::Object { fields: collected })
    }

    pub fn union(self, typename: &str, clauses: Vec<&str>) -> Self {
        let clauses = clauses.into_iter().map(str::to_owned).collect();
        self.declare(typename, TypeDecl::Union { clauses })
    }

    pub fn scalar(self, typename: &str, ground: GroundType) -> Self {
        self.declare(typename, TypeDecl::Scalar { ground })
    }

    pub fn enum_type(self, typename: &str, values: Vec<&str>) -> Self {
        let values = values.into_iter().map(str::to_owned).collect();
        self.declare(typename, TypeDecl::Enum { values })
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        match self.error {
            Some(error) => Err(error),
            None => Schema::new(self.types),
        }
    }

    fn declare(mut self, typename: &str, decl: TypeDecl) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.types.insert(typename.to_owned(), decl).is_some() {
            return self.fail(SchemaError::DuplicateType(typename.to_owned()));
        }
        self
    }

    fn fail(mut self, error: SchemaError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}
