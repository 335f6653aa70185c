//! Graphviz DOT export of machine definitions.
//!
//! Output layout:
//!
//! ```text
//! digraph "<machine name>" {
//!   <raw attribute>
//!   <state> [peripheries=2];
//!   <from> -> <to> [color=<color>,label="<message>"];
//! }
//! ```
//!
//! The double-bordered node is the highlighted state: the current state if
//! one is given, otherwise the initial state. A current state the machine
//! does not declare is not drawn. Edges follow declaration order
//! and are colored by event kind, so the same inputs always render the same
//! bytes.

use crate::definition::{EventKind, MachineDefinition};
use std::fmt::Write;

/// Edge color for an event kind.
pub fn edge_color(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Send => "red",
        EventKind::Recv => "blue",
    }
}

/// Renders a definition as a DOT digraph.
pub struct DotExporter<'a, D> {
    definition: &'a MachineDefinition<D>,
    name: Option<&'a str>,
    current: Option<&'a str>,
    attributes: Vec<&'a str>,
}

impl<'a, D> DotExporter<'a, D> {
    pub fn new(definition: &'a MachineDefinition<D>) -> Self {
        Self {
            definition,
            name: None,
            current: None,
            attributes: Vec::new(),
        }
    }

    /// Overrides the graph label (defaults to the machine name).
    pub fn name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Highlights `state` instead of the initial state.
    pub fn current(mut self, state: &'a str) -> Self {
        self.current = Some(state);
        self
    }

    /// Adds a raw graph attribute line, written verbatim.
    pub fn attribute(mut self, attribute: &'a str) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attributes(mut self, attributes: impl IntoIterator<Item = &'a str>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let name = self.name.unwrap_or_else(|| self.definition.name());
        let current = self
            .current
            .unwrap_or_else(|| self.definition.initial().as_str());

        // Writing to a String cannot fail.
        let _ = writeln!(out, "digraph \"{}\" {{", escape(name));
        for attribute in &self.attributes {
            let attribute = attribute.trim();
            if !attribute.is_empty() {
                let _ = writeln!(out, "  {}", attribute);
            }
        }
        if self.definition.has_state(current) {
            let _ = writeln!(out, "  {} [peripheries=2];", node_id(current));
        }
        for t in self.definition.transitions() {
            let _ = writeln!(
                out,
                "  {} -> {} [color={},label=\"{}\"];",
                node_id(t.from.as_str()),
                node_id(t.to.as_str()),
                edge_color(t.kind),
                escape(&t.message)
            );
        }
        out.push_str("}\n");
        out
    }
}

impl<D> MachineDefinition<D> {
    /// Renders this definition as DOT; see [`DotExporter`].
    pub fn to_dot(&self, current: Option<&str>, attributes: &[&str]) -> String {
        let mut exporter = DotExporter::new(self).attributes(attributes.iter().copied());
        if let Some(state) = current {
            exporter = exporter.current(state);
        }
        exporter.render()
    }
}

fn is_plain_id(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn node_id(state: &str) -> String {
    if is_plain_id(state) {
        state.to_string()
    } else {
        format!("\"{}\"", escape(state))
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}
