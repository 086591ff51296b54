//! Compiled program units: nodes and the program that contains them.

use std::collections::HashMap;

use crate::instruction::{Instruction, Opcode, Operand};
use crate::strings::{StringRow, StringTable};

/// A named, linearly addressed block of instructions with a local label
/// index. Immutable once loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    name: String,
    code: Vec<Instruction>,
    labels: HashMap<String, usize>,
    tags: Vec<String>,
    source_string_id: Option<String>,
}

impl Node {
    /// Create a node, precomputing the label index from the `Label`
    /// instructions in `code`. The machine never scans code to resolve a
    /// jump.
    pub fn new(name: impl Into<String>, code: Vec<Instruction>) -> Self {
        let mut labels = HashMap::new();
        for (index, ins) in code.iter().enumerate() {
            if ins.opcode == Opcode::Label
                && let Some(Operand::String(label)) = &ins.opa
            {
                labels.insert(label.clone(), index);
            }
        }
        Self {
            name: name.into(),
            code,
            labels,
            tags: Vec::new(),
            source_string_id: None,
        }
    }

    /// Attach header tags to this node.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Record the string-table id of this node's source text.
    pub fn with_source_string_id(mut self, id: impl Into<String>) -> Self {
        self.source_string_id = Some(id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Look up the instruction index of a label.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn source_string_id(&self) -> Option<&str> {
        self.source_string_id.as_deref()
    }

    /// String-table ids of every line this node can deliver (`RunLine` and
    /// `AddOption` operands), in code order.
    pub fn line_ids(&self) -> Vec<String> {
        self.code
            .iter()
            .filter(|ins| matches!(ins.opcode, Opcode::RunLine | Opcode::AddOption))
            .filter_map(|ins| ins.opa.as_ref().and_then(Operand::as_str))
            .map(str::to_string)
            .collect()
    }
}

/// A compiled program: a collection of nodes plus the string table shared
/// across them. Read-only for the machine's lifetime and shareable between
/// machine instances.
#[derive(Clone, Debug, Default)]
pub struct Program {
    nodes: HashMap<String, Node>,
    strings: StringTable,
}

impl Program {
    /// Create an empty program over a string table.
    pub fn new(strings: StringTable) -> Self {
        Self {
            nodes: HashMap::new(),
            strings,
        }
    }

    /// Add a node, replacing any previous node of the same name.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.name().to_string(), node);
    }

    /// Chainable form of [`Program::add_node`].
    pub fn with_node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Look up a string-table row by id.
    pub fn string(&self, id: &str) -> Option<&StringRow> {
        self.strings.get(id)
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Names of all nodes, in no particular order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}
