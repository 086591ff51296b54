//! The instruction set of the dialogue machine.

use thiserror::Error;

/// Raw opcode that does not name any operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("invalid opcode {0}")]
pub struct InvalidOpcode(pub i32);

/// The operations the machine can perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Marks a jump target. No effect at runtime; targets are precomputed
    /// into the node's label index at load.
    Label,
    /// Jump to the label named by operand A.
    JumpTo,
    /// Peek a string from the stack and jump to the label it names.
    /// The stack is not popped.
    Jump,
    /// Deliver a line to the handler. Operand A is a string-table id.
    RunLine,
    /// Deliver a command to the handler. Operand A is the command text.
    RunCommand,
    /// Append an option to the pending list. Operand A is the string-table
    /// id of the display line, operand B the destination node or label.
    AddOption,
    /// Present the pending options, then clear the list. The selected
    /// destination will be on top of the stack when execution resumes.
    ShowOptions,
    /// Push the string-table text named by operand A.
    PushString,
    /// Push a number. Operand A is the number.
    PushNumber,
    /// Push a boolean. Operand A is the boolean.
    PushBool,
    /// Push a null value.
    PushNull,
    /// Jump to the label named by operand A unless the top of the stack is
    /// truthy. The stack is not popped.
    JumpIfFalse,
    /// Discard the top of the stack.
    Pop,
    /// Call the host function named by operand A. Arguments are popped from
    /// the stack; the result, if any, is pushed.
    CallFunc,
    /// Push the value of the variable named by operand A.
    PushVariable,
    /// Store the top of the stack (without popping) in the variable named
    /// by operand A.
    StoreVariable,
    /// Stop execution.
    Stop,
    /// Switch to the node named by operand A, or by the string on top of
    /// the stack when operand A is absent or empty.
    RunNode,
}

impl Opcode {
    /// Decode a loader-provided raw opcode.
    pub fn from_i32(raw: i32) -> Result<Self, InvalidOpcode> {
        match raw {
            0 => Ok(Opcode::Label),
            1 => Ok(Opcode::JumpTo),
            2 => Ok(Opcode::Jump),
            3 => Ok(Opcode::RunLine),
            4 => Ok(Opcode::RunCommand),
            5 => Ok(Opcode::AddOption),
            6 => Ok(Opcode::ShowOptions),
            7 => Ok(Opcode::PushString),
            8 => Ok(Opcode::PushNumber),
            9 => Ok(Opcode::PushBool),
            10 => Ok(Opcode::PushNull),
            11 => Ok(Opcode::JumpIfFalse),
            12 => Ok(Opcode::Pop),
            13 => Ok(Opcode::CallFunc),
            14 => Ok(Opcode::PushVariable),
            15 => Ok(Opcode::StoreVariable),
            16 => Ok(Opcode::Stop),
            17 => Ok(Opcode::RunNode),
            _ => Err(InvalidOpcode(raw)),
        }
    }
}

/// An instruction operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// String operand (label names, string-table ids, variable and
    /// function names, command text).
    String(String),
    /// Number operand.
    Number(f64),
    /// Boolean operand.
    Bool(bool),
}

impl Operand {
    /// Name of this operand's variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Operand::String(_) => "string",
            Operand::Number(_) => "number",
            Operand::Bool(_) => "bool",
        }
    }

    /// Try to get as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Operand::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// A single machine instruction: an opcode and up to two operands.
///
/// Operand types are fixed per opcode; the machine reports a fatal type
/// mismatch when an operand does not match what the opcode requires.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub opa: Option<Operand>,
    pub opb: Option<Operand>,
}

impl Instruction {
    /// Create an instruction with no operands.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            opa: None,
            opb: None,
        }
    }

    fn with_a(opcode: Opcode, opa: Operand) -> Self {
        Self {
            opcode,
            opa: Some(opa),
            opb: None,
        }
    }

    fn with_ab(opcode: Opcode, opa: Operand, opb: Operand) -> Self {
        Self {
            opcode,
            opa: Some(opa),
            opb: Some(opb),
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::with_a(Opcode::Label, Operand::String(name.into()))
    }

    pub fn jump_to(label: impl Into<String>) -> Self {
        Self::with_a(Opcode::JumpTo, Operand::String(label.into()))
    }

    pub fn jump() -> Self {
        Self::new(Opcode::Jump)
    }

    pub fn run_line(id: impl Into<String>) -> Self {
        Self::with_a(Opcode::RunLine, Operand::String(id.into()))
    }

    pub fn run_command(text: impl Into<String>) -> Self {
        Self::with_a(Opcode::RunCommand, Operand::String(text.into()))
    }

    pub fn add_option(line: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::with_ab(
            Opcode::AddOption,
            Operand::String(line.into()),
            Operand::String(destination.into()),
        )
    }

    pub fn show_options() -> Self {
        Self::new(Opcode::ShowOptions)
    }

    pub fn push_string(id: impl Into<String>) -> Self {
        Self::with_a(Opcode::PushString, Operand::String(id.into()))
    }

    pub fn push_number(n: f64) -> Self {
        Self::with_a(Opcode::PushNumber, Operand::Number(n))
    }

    pub fn push_bool(b: bool) -> Self {
        Self::with_a(Opcode::PushBool, Operand::Bool(b))
    }

    pub fn push_null() -> Self {
        Self::new(Opcode::PushNull)
    }

    pub fn jump_if_false(label: impl Into<String>) -> Self {
        Self::with_a(Opcode::JumpIfFalse, Operand::String(label.into()))
    }

    pub fn pop() -> Self {
        Self::new(Opcode::Pop)
    }

    pub fn call_func(name: impl Into<String>) -> Self {
        Self::with_a(Opcode::CallFunc, Operand::String(name.into()))
    }

    pub fn push_variable(name: impl Into<String>) -> Self {
        Self::with_a(Opcode::PushVariable, Operand::String(name.into()))
    }

    pub fn store_variable(name: impl Into<String>) -> Self {
        Self::with_a(Opcode::StoreVariable, Operand::String(name.into()))
    }

    pub fn stop() -> Self {
        Self::new(Opcode::Stop)
    }

    /// `RunNode` taking its destination from the top of the stack.
    pub fn run_node() -> Self {
        Self::new(Opcode::RunNode)
    }

    /// `RunNode` with an explicit destination node.
    pub fn run_node_named(node: impl Into<String>) -> Self {
        Self::with_a(Opcode::RunNode, Operand::String(node.into()))
    }
}
