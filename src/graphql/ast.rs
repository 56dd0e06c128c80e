// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use crate::graphql::Layout;

/// A complete query document: an ordered sequence of definitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    definitions: Vec<Definition>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definition(mut self, definition: impl Into<Definition>) -> Self {
        self.definitions.push(definition.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Serialises the document with the given layout strategy.
    pub fn format(&self, layout: &Layout) -> String {
        let parts: Vec<String> = self
            .definitions
            .iter()
            .map(|definition| definition.format(layout))
            .collect();
        parts.join(layout.separator())
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(&Layout::multiline("  ")))
    }
}

/// A top-level definition: a named query or a named fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Query(QueryDefinition),
    Fragment(FragmentDefinition),
}

impl Definition {
    fn format(&self, layout: &Layout) -> String {
        match self {
            Definition::Query(query) => query.format(layout),
            Definition::Fragment(fragment) => fragment.format(layout),
        }
    }
}

impl From<QueryDefinition> for Definition {
    fn from(query: QueryDefinition) -> Self {
        Definition::Query(query)
    }
}

impl From<FragmentDefinition> for Definition {
    fn from(fragment: FragmentDefinition) -> Self {
        Definition::Fragment(fragment)
    }
}

/// A named query with optional variable parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    name: String,
    params: Vec<(String, String)>,
    selections: Vec<Selection>,
}

impl QueryDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            params: Vec::new(),
            selections: Vec::new(),
        }
    }

    /// Declares a variable parameter, e.g. `param("id", "ID!")` for
    /// `$id: ID!`.
    pub fn param(mut self, name: &str, type_name: &str) -> Self {
        self.params.push((name.to_owned(), type_name.to_owned()));
        self
    }

    pub fn select(mut self, selection: impl Into<Selection>) -> Self {
        self.selections.push(selection.into());
        self
    }

    pub fn selections(mut self, selections: Vec<Selection>) -> Self {
        self.selections.extend(selections);
        self
    }

    fn format(&self, layout: &Layout) -> String {
        let mut out = layout.prefix();
        out.push_str("query ");
        out.push_str(&self.name);
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(name, type_name)| format!("${}: {}", name, type_name))
                .collect();
            out.push('(');
            out.push_str(&params.join(", "));
            out.push(')');
        }
        out.push(' ');
        out.push_str(&format_selection_set(&self.selections, layout));
        out
    }
}

/// A named fragment with a type condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    name: String,
    type_condition: String,
    selections: Vec<Selection>,
}

impl FragmentDefinition {
    pub fn new(name: &str, type_condition: &str) -> Self {
        Self {
            name: name.to_owned(),
            type_condition: type_condition.to_owned(),
            selections: Vec::new(),
        }
    }

    pub fn select(mut self, selection: impl Into<Selection>) -> Self {
        self.selections.push(selection.into());
        self
    }

    fn format(&self, layout: &Layout) -> String {
        let mut out = layout.prefix();
        out.push_str("fragment ");
        out.push_str(&self.name);
        out.push_str(" on ");
        out.push_str(&self.type_condition);
        out.push(' ');
        out.push_str(&format_selection_set(&self.selections, layout));
        out
    }
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(String),
    InlineFragment {
        type_condition: String,
        selections: Vec<Selection>,
    },
}

impl Selection {
    /// A `...Name` spread of a named fragment.
    pub fn fragment_spread(name: &str) -> Self {
        Selection::FragmentSpread(name.to_owned())
    }

    /// A `... on Type { … }` inline fragment.
    pub fn inline_fragment(type_condition: &str, selections: Vec<Selection>) -> Self {
        Selection::InlineFragment {
            type_condition: type_condition.to_owned(),
            selections,
        }
    }

    fn format(&self, layout: &Layout) -> String {
        match self {
            Selection::Field(field) => field.format(layout),
            Selection::FragmentSpread(name) => format!("{}...{}", layout.prefix(), name),
            Selection::InlineFragment {
                type_condition,
                selections,
            } => format!(
                "{}... on {} {}",
                layout.prefix(),
                type_condition,
                format_selection_set(selections, layout)
            ),
        }
    }
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Selection::Field(field)
    }
}

/// A field selection with optional alias, arguments and sub-selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    alias: Option<String>,
    name: String,
    args: Vec<(String, QueryValue)>,
    selections: Vec<Selection>,
}

impl Field {
    pub fn new(name: &str) -> Self {
        Self {
            alias: None,
            name: name.to_owned(),
            args: Vec::new(),
            selections: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_owned());
        self
    }

    pub fn arg(mut self, name: &str, value: QueryValue) -> Self {
        self.args.push((name.to_owned(), value));
        self
    }

    pub fn select(mut self, selection: impl Into<Selection>) -> Self {
        self.selections.push(selection.into());
        self
    }

    pub fn selections(mut self, selections: Vec<Selection>) -> Self {
        self.selections.extend(selections);
        self
    }

    fn format(&self, layout: &Layout) -> String {
        let mut out = layout.prefix();
        if let Some(alias) = &self.alias {
            out.push_str(alias);
            out.push_str(": ");
        }
        out.push_str(&self.name);
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value.format()))
                .collect();
            out.push('(');
            out.push_str(&args.join(", "));
            out.push(')');
        }
        if !self.selections.is_empty() {
            out.push(' ');
            out.push_str(&format_selection_set(&self.selections, layout));
        }
        out
    }
}

/// A literal or variable in argument position.
///
/// Values always serialise inline, independent of the surrounding layout.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Variable(String),
    String(String),
    Int(i64),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<QueryValue>),
    Object(Vec<(String, QueryValue)>),
}

impl QueryValue {
    pub fn variable(name: &str) -> Self {
        QueryValue::Variable(name.to_owned())
    }

    pub fn string(value: &str) -> Self {
        QueryValue::String(value.to_owned())
    }

    pub fn enum_(value: &str) -> Self {
        QueryValue::Enum(value.to_owned())
    }

    fn format(&self) -> String {
        match self {
            QueryValue::Variable(name) => format!("${}", name),
            QueryValue::String(value) => format!("\"{}\"", escape_string(value)),
            QueryValue::Int(value) => value.to_string(),
            QueryValue::Boolean(value) => value.to_string(),
            QueryValue::Null => "null".to_owned(),
            QueryValue::Enum(value) => value.clone(),
            QueryValue::List(values) => {
                let parts: Vec<String> = values.iter().map(QueryValue::format).collect();
                format!("[{}]", parts.join(", "))
            }
            QueryValue::Object(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value.format()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }
}

fn format_selection_set(selections: &[Selection], layout: &Layout) -> String {
    let inner = layout.nested();
    let mut out = String::from("{");
    match layout {
        Layout::Multiline { .. } => {
            for selection in selections {
                out.push('\n');
                out.push_str(&selection.format(&inner));
            }
            out.push('\n');
            out.push_str(&layout.prefix());
            out.push('}');
        }
        Layout::Inline => {
            for selection in selections {
                out.push(' ');
                out.push_str(&selection.format(&inner));
            }
            out.push_str(" }");
        }
    }
    out
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
