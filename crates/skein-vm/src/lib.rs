//! Skein Virtual Machine
//!
//! This crate provides the interpreter for compiled skein dialogue
//! programs. It is embedder-agnostic through three traits, allowing
//! different hosts to be plugged in:
//!
//! - [`DialogueHandler`] receives dialogue events (lines, options,
//!   commands) and lifecycle callbacks,
//! - [`VariableStorage`] backs the variables scripts read and write,
//! - [`Library`] resolves the host functions scripts can call.
//!
//! # Architecture
//!
//! The VM handles:
//! - Operand stack management over the [`skein_core::Value`] domain
//! - The instruction dispatch loop and per-opcode semantics
//! - Suspension on option menus and the explicit resume protocol
//! - Error propagation out of embedder callbacks
//!
//! A machine executes one node at a time, single-threaded and cooperative:
//! control leaves the interpreter only inside handler callbacks and while
//! waiting on an option selection.
//!
//! # Example
//!
//! ```ignore
//! use skein_vm::{FunctionTable, MemoryStorage, VirtualMachine};
//!
//! let mut vm = VirtualMachine::new(program, handler, MemoryStorage::new(), FunctionTable::new());
//! vm.run("Start")?;
//! ```

mod error;
mod execute;
mod handler;
mod library;
mod machine;
mod storage;
mod testplan;

// Re-export public types
pub use error::RuntimeError;
pub use handler::{DialogueHandler, HandlerResult};
pub use library::{Function, FunctionTable, Library};
pub use machine::{DialogueOption, ExecPhase, MachineState, OptionsResume, VirtualMachine};
pub use storage::{MemoryStorage, VariableStorage};
pub use testplan::{StepKind, TestPlan, TestPlanError, TestStep};
