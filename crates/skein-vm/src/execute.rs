//! The execution loop and per-opcode semantics.
//!
//! `run` drives a node-by-node execution to completion; `step` executes a
//! single instruction. Jump-class opcodes set the program counter to the
//! label target directly (the label is the next instruction executed);
//! every other opcode advances past itself. A run suspends between
//! `ShowOptions` and the handler's resume, during which no instruction
//! executes.

use std::sync::Arc;

use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace};

use skein_core::{Instruction, Node, Opcode, Operand, Value};

use crate::error::RuntimeError;
use crate::handler::DialogueHandler;
use crate::library::Library;
use crate::machine::{DialogueOption, ExecPhase, MachineState, OptionsResume, VirtualMachine};
use crate::storage::VariableStorage;

impl<H, V, L> VirtualMachine<H, V, L>
where
    H: DialogueHandler,
    V: VariableStorage,
    L: Library,
{
    /// Run the program from `start` until it stops.
    ///
    /// Discards any previous run's state, delivers `node_start`, then steps
    /// until the machine stops. A clean stop delivers `node_complete` for
    /// the last node entered followed by `dialogue_complete`; an error
    /// aborts without either and leaves the machine stopped.
    pub fn run(&mut self, start: &str) -> Result<(), RuntimeError> {
        self.state = MachineState::new(start, self.max_stack_depth);
        self.state.phase = ExecPhase::Running;
        debug!(start, "run starting");
        match self.run_loop(start) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state.phase = ExecPhase::Stopped;
                Err(err)
            }
        }
    }

    fn run_loop(&mut self, start: &str) -> Result<(), RuntimeError> {
        self.enter_node(start)?;
        while self.state.phase != ExecPhase::Stopped {
            self.step()?;
        }
        let last = self.state.node.clone();
        self.handler.node_complete(&last).map_err(RuntimeError::Handler)?;
        self.handler.dialogue_complete().map_err(RuntimeError::Handler)?;
        debug!(node = %last, "dialogue complete");
        Ok(())
    }

    /// Execute the next instruction of the current node.
    ///
    /// Does nothing once the machine is stopped. Fails `NotReady` while an
    /// option selection is pending.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        match self.state.phase {
            ExecPhase::Stopped => return Ok(()),
            ExecPhase::WaitingOnOptionSelection => return Err(RuntimeError::NotReady),
            ExecPhase::Running => {}
        }
        let program = Arc::clone(&self.program);
        let node = program
            .node(&self.state.node)
            .ok_or_else(|| RuntimeError::UnknownNode(self.state.node.clone()))?;
        let len = node.code().len();
        // pc == len means the node has fallen off its end.
        if self.state.pc == len {
            self.state.phase = ExecPhase::Stopped;
            return Ok(());
        }
        if self.state.pc > len {
            return Err(RuntimeError::IllegalState(format!(
                "pc {} outside node {:?} [0, {}]",
                self.state.pc, self.state.node, len
            )));
        }
        let ins = &node.code()[self.state.pc];
        trace!(node = %self.state.node, pc = self.state.pc, opcode = ?ins.opcode, "step");
        self.execute(ins, node)?;
        if self.state.phase == ExecPhase::Running
            && let Some(current) = program.node(&self.state.node)
            && self.state.pc >= current.code().len()
        {
            self.state.phase = ExecPhase::Stopped;
        }
        Ok(())
    }

    fn execute(&mut self, ins: &Instruction, node: &Node) -> Result<(), RuntimeError> {
        let mut next = self.state.pc + 1;
        match ins.opcode {
            Opcode::Label => {}

            Opcode::JumpTo => {
                let label = str_operand(ins.opa.as_ref(), "JumpTo operand A")?;
                next = label_target(node, label)?;
            }

            Opcode::Jump => {
                let label = self.state.peek_str("Jump")?;
                next = label_target(node, label)?;
            }

            Opcode::RunLine => {
                let id = str_operand(ins.opa.as_ref(), "RunLine operand A")?;
                self.handler.line(id).map_err(RuntimeError::Handler)?;
            }

            Opcode::RunCommand => {
                let command = str_operand(ins.opa.as_ref(), "RunCommand operand A")?;
                self.handler.command(command).map_err(RuntimeError::Handler)?;
            }

            Opcode::AddOption => {
                let line = str_operand(ins.opa.as_ref(), "AddOption operand A")?;
                let destination = str_operand(ins.opb.as_ref(), "AddOption operand B")?;
                self.state.options.push(DialogueOption {
                    line: line.to_string(),
                    destination: destination.to_string(),
                });
            }

            Opcode::ShowOptions => self.show_options()?,

            Opcode::PushString => {
                let id = str_operand(ins.opa.as_ref(), "PushString operand A")?;
                let text = self
                    .program
                    .string(id)
                    .ok_or_else(|| RuntimeError::UnknownString(id.to_string()))?
                    .text
                    .clone();
                self.state.push(Value::String(text))?;
            }

            Opcode::PushNumber => {
                let n = number_operand(ins.opa.as_ref(), "PushNumber operand A")?;
                self.state.push(Value::Number(n))?;
            }

            Opcode::PushBool => {
                let b = bool_operand(ins.opa.as_ref(), "PushBool operand A")?;
                self.state.push(Value::Bool(b))?;
            }

            Opcode::PushNull => self.state.push(Value::Null)?,

            Opcode::JumpIfFalse => {
                if !self.state.peek()?.is_truthy() {
                    let label = str_operand(ins.opa.as_ref(), "JumpIfFalse operand A")?;
                    next = label_target(node, label)?;
                }
            }

            Opcode::Pop => {
                self.state.pop()?;
            }

            Opcode::CallFunc => {
                let name = str_operand(ins.opa.as_ref(), "CallFunc operand A")?;
                self.call_function(name)?;
            }

            Opcode::PushVariable => {
                let name = str_operand(ins.opa.as_ref(), "PushVariable operand A")?;
                let value = self
                    .vars
                    .get(name)
                    .ok_or_else(|| RuntimeError::UnknownVariable(name.to_string()))?;
                self.state.push(value)?;
            }

            Opcode::StoreVariable => {
                let name = str_operand(ins.opa.as_ref(), "StoreVariable operand A")?;
                let value = self.state.peek()?.clone();
                self.vars.set(name, value);
            }

            Opcode::Stop => {
                self.state.phase = ExecPhase::Stopped;
            }

            Opcode::RunNode => {
                let target = match ins.opa.as_ref() {
                    Some(Operand::String(name)) if !name.is_empty() => name.clone(),
                    Some(Operand::String(_)) | None => {
                        self.state.peek_str("RunNode")?.to_string()
                    }
                    Some(other) => {
                        return Err(RuntimeError::TypeMismatch {
                            context: "RunNode operand A",
                            expected: "string",
                            got: other.type_name().to_string(),
                        });
                    }
                };
                let previous = self.state.node.clone();
                debug!(from = %previous, to = %target, "switching node");
                self.handler
                    .node_complete(&previous)
                    .map_err(RuntimeError::Handler)?;
                self.enter_node(&target)?;
                // Execution continues at the top of the new node.
                return Ok(());
            }
        }
        self.state.pc = next;
        Ok(())
    }

    /// Validate and switch to a node, resetting the program counter and
    /// delivering `node_start` and the preload hint.
    fn enter_node(&mut self, name: &str) -> Result<(), RuntimeError> {
        let node = self
            .program
            .node(name)
            .ok_or_else(|| RuntimeError::UnknownNode(name.to_string()))?;
        let lines = node.line_ids();
        self.state.node = name.to_string();
        self.state.pc = 0;
        self.handler.node_start(name).map_err(RuntimeError::Handler)?;
        self.handler
            .prepare_for_lines(&lines)
            .map_err(RuntimeError::Handler)?;
        Ok(())
    }

    fn show_options(&mut self) -> Result<(), RuntimeError> {
        match self.state.options.len() {
            0 => Err(RuntimeError::IllegalState(
                "no options to show".to_string(),
            )),
            1 => {
                // A lone option is selected without consulting the handler.
                let destination = self.state.options[0].destination.clone();
                self.state.options.clear();
                self.state.push(Value::String(destination))
            }
            count => {
                let ids: Vec<String> =
                    self.state.options.iter().map(|o| o.line.clone()).collect();
                debug!(options = count, "waiting on option selection");
                self.state.phase = ExecPhase::WaitingOnOptionSelection;
                let resume = OptionsResume::new(&mut self.state);
                self.handler.options(&ids, resume).map_err(RuntimeError::Handler)
            }
        }
    }

    fn call_function(&mut self, name: &str) -> Result<(), RuntimeError> {
        let function = self
            .library
            .function(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        let declared = function.param_count();
        let count = if declared < 0 {
            // Variadic: the argument count precedes the arguments.
            let n = self.state.pop_number("variadic argument count")?;
            if !n.is_finite() || n.fract() != 0.0 || n < 0.0 {
                return Err(RuntimeError::TypeMismatch {
                    context: "variadic argument count",
                    expected: "non-negative integer",
                    got: format!("number {n}"),
                });
            }
            n as usize
        } else {
            declared as usize
        };
        let mut args: SmallVec<[Value; 8]> = smallvec![Value::Null; count];
        // Fill back to front so the value pushed first comes first.
        for slot in args.iter_mut().rev() {
            *slot = self.state.pop()?;
        }
        trace!(function = name, args = count, "calling host function");
        let result = function.invoke(&args).map_err(RuntimeError::Library)?;
        if function.returns() {
            self.state.push(result)?;
        }
        Ok(())
    }
}

fn label_target(node: &Node, label: &str) -> Result<usize, RuntimeError> {
    node.label(label)
        .ok_or_else(|| RuntimeError::UnknownLabel(label.to_string()))
}

fn str_operand<'a>(
    operand: Option<&'a Operand>,
    context: &'static str,
) -> Result<&'a str, RuntimeError> {
    match operand {
        Some(Operand::String(s)) => Ok(s),
        Some(other) => Err(RuntimeError::TypeMismatch {
            context,
            expected: "string",
            got: other.type_name().to_string(),
        }),
        None => Err(RuntimeError::TypeMismatch {
            context,
            expected: "string",
            got: "nothing".to_string(),
        }),
    }
}

fn number_operand(operand: Option<&Operand>, context: &'static str) -> Result<f64, RuntimeError> {
    match operand {
        Some(Operand::Number(n)) => Ok(*n),
        Some(other) => Err(RuntimeError::TypeMismatch {
            context,
            expected: "number",
            got: other.type_name().to_string(),
        }),
        None => Err(RuntimeError::TypeMismatch {
            context,
            expected: "number",
            got: "nothing".to_string(),
        }),
    }
}

fn bool_operand(operand: Option<&Operand>, context: &'static str) -> Result<bool, RuntimeError> {
    match operand {
        Some(Operand::Bool(b)) => Ok(*b),
        Some(other) => Err(RuntimeError::TypeMismatch {
            context,
            expected: "bool",
            got: other.type_name().to_string(),
        }),
        None => Err(RuntimeError::TypeMismatch {
            context,
            expected: "bool",
            got: "nothing".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use skein_core::{Instruction, Node, Program, StringRow, StringTable};

    use super::*;
    use crate::library::FunctionTable;
    use crate::storage::MemoryStorage;

    /// Handler that records every event as a formatted string.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        selection: Option<usize>,
    }

    impl DialogueHandler for Recorder {
        fn line(&mut self, line: &str) -> Result<(), String> {
            self.events.push(format!("line {line}"));
            Ok(())
        }

        fn command(&mut self, command: &str) -> Result<(), String> {
            self.events.push(format!("command {command}"));
            Ok(())
        }

        fn options(&mut self, options: &[String], resume: OptionsResume<'_>) -> Result<(), String> {
            self.events.push(format!("options {}", options.join(",")));
            match self.selection {
                Some(index) => resume.select(index).map_err(|e| e.to_string()),
                None => Ok(()),
            }
        }

        fn node_start(&mut self, node: &str) -> Result<(), String> {
            self.events.push(format!("start {node}"));
            Ok(())
        }

        fn node_complete(&mut self, node: &str) -> Result<(), String> {
            self.events.push(format!("complete {node}"));
            Ok(())
        }

        fn dialogue_complete(&mut self) -> Result<(), String> {
            self.events.push("done".to_string());
            Ok(())
        }
    }

    fn machine(
        program: Program,
    ) -> VirtualMachine<Recorder, MemoryStorage, FunctionTable> {
        VirtualMachine::new(
            Arc::new(program),
            Recorder::default(),
            MemoryStorage::new(),
            FunctionTable::new(),
        )
    }

    fn strings(rows: &[(&str, &str)]) -> StringTable {
        let mut table = StringTable::new();
        for (id, text) in rows {
            table.insert(StringRow::new(*id, *text));
        }
        table
    }

    #[test]
    fn linear_lines_to_completion() {
        let program = Program::new(strings(&[("L1", "Hello"), ("L2", "World")])).with_node(
            Node::new(
                "Start",
                vec![
                    Instruction::run_line("L1"),
                    Instruction::run_line("L2"),
                    Instruction::stop(),
                ],
            ),
        );
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(vm.phase(), ExecPhase::Stopped);
        assert_eq!(
            vm.into_handler().events,
            ["start Start", "line L1", "line L2", "complete Start", "done"]
        );
    }

    #[test]
    fn falling_off_the_end_stops_cleanly() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::run_line("L1")]));
        // RunLine on an id the handler just records; no string table needed.
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(
            vm.into_handler().events,
            ["start Start", "line L1", "complete Start", "done"]
        );
    }

    #[test]
    fn jump_targets_the_label_instruction() {
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::jump_to("skip"),
                Instruction::run_line("missed"),
                Instruction::label("skip"),
                Instruction::run_line("hit"),
                Instruction::stop(),
            ],
        ));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        let events = vm.into_handler().events;
        assert!(events.contains(&"line hit".to_string()));
        assert!(!events.contains(&"line missed".to_string()));
    }

    #[test]
    fn jump_peeks_destination_without_popping() {
        let program = Program::new(strings(&[("dst", "target")])).with_node(Node::new(
            "Start",
            vec![
                Instruction::push_string("dst"),
                Instruction::jump(),
                Instruction::label("target"),
                Instruction::stop(),
            ],
        ));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(vm.state().stack(), [Value::string("target")]);
    }

    #[test]
    fn jump_if_false_treats_nan_as_nonzero() {
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::push_number(f64::NAN),
                Instruction::jump_if_false("skip"),
                Instruction::run_line("taken"),
                Instruction::label("skip"),
                Instruction::stop(),
            ],
        ));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert!(vm.into_handler().events.contains(&"line taken".to_string()));
    }

    #[test]
    fn unknown_start_node_fails() {
        let program = Program::new(StringTable::new());
        let mut vm = machine(program);
        let err = vm.run("Missing").unwrap_err();
        assert_eq!(err, RuntimeError::UnknownNode("Missing".to_string()));
        assert_eq!(vm.phase(), ExecPhase::Stopped);
        // Aborted runs deliver neither node_complete nor dialogue_complete.
        assert!(vm.into_handler().events.is_empty());
    }

    #[test]
    fn unknown_jump_label_fails() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::jump_to("nowhere")]));
        let mut vm = machine(program);
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::UnknownLabel("nowhere".to_string()))
        );
    }

    #[test]
    fn step_is_a_noop_when_stopped() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::stop()]));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(vm.step(), Ok(()));
        assert_eq!(vm.phase(), ExecPhase::Stopped);
    }

    #[test]
    fn stop_leaves_the_machine_stopped() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::stop()]));
        let mut vm = machine(program);
        vm.stop();
        assert_eq!(vm.phase(), ExecPhase::Stopped);
        vm.run("Start").unwrap();
        vm.stop();
        assert_eq!(vm.phase(), ExecPhase::Stopped);
    }

    #[test]
    fn step_while_waiting_fails_not_ready() {
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::add_option("line:a", "a"),
                Instruction::add_option("line:b", "b"),
                Instruction::show_options(),
                Instruction::jump(),
                Instruction::label("a"),
                Instruction::label("b"),
                Instruction::stop(),
            ],
        ));
        let mut vm = machine(program);
        // The recorder defers (selection = None), so the run aborts on the
        // step after the suspension.
        let err = vm.run("Start").unwrap_err();
        assert_eq!(err, RuntimeError::NotReady);
    }

    #[test]
    fn handler_error_aborts_without_completion() {
        struct Failing;
        impl DialogueHandler for Failing {
            fn line(&mut self, _line: &str) -> Result<(), String> {
                Err("embedder said no".to_string())
            }
            fn command(&mut self, _command: &str) -> Result<(), String> {
                Ok(())
            }
            fn options(
                &mut self,
                _options: &[String],
                _resume: OptionsResume<'_>,
            ) -> Result<(), String> {
                Ok(())
            }
        }

        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::run_line("L1")]));
        let mut vm = VirtualMachine::new(
            Arc::new(program),
            Failing,
            MemoryStorage::new(),
            FunctionTable::new(),
        );
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::Handler("embedder said no".to_string()))
        );
        assert_eq!(vm.phase(), ExecPhase::Stopped);
    }

    #[test]
    fn store_then_push_roundtrips() {
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::push_number(6.0),
                Instruction::store_variable("r"),
                Instruction::pop(),
                Instruction::push_variable("r"),
                Instruction::stop(),
            ],
        ));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(vm.state().stack(), [Value::Number(6.0)]);
        assert_eq!(vm.vars().get("r"), Some(Value::Number(6.0)));
    }

    #[test]
    fn store_variable_keeps_value_on_stack() {
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::push_bool(true),
                Instruction::store_variable("seen"),
                Instruction::stop(),
            ],
        ));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(vm.state().stack(), [Value::Bool(true)]);
    }

    #[test]
    fn push_variable_missing_is_fatal() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::push_variable("ghost")]));
        let mut vm = machine(program);
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::UnknownVariable("ghost".to_string()))
        );
    }

    #[test]
    fn pop_on_empty_stack_is_fatal() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::pop()]));
        let mut vm = machine(program);
        assert_eq!(vm.run("Start"), Err(RuntimeError::StackUnderflow));
    }

    #[test]
    fn push_string_resolves_through_table() {
        let program = Program::new(strings(&[("line:greet", "Hi there")])).with_node(
            Node::new(
                "Start",
                vec![Instruction::push_string("line:greet"), Instruction::stop()],
            ),
        );
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(vm.state().stack(), [Value::string("Hi there")]);
    }

    #[test]
    fn push_string_unknown_id_is_fatal() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::push_string("line:x")]));
        let mut vm = machine(program);
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::UnknownString("line:x".to_string()))
        );
    }

    #[test]
    fn operand_type_mismatch_is_fatal() {
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![Instruction {
                opcode: Opcode::RunLine,
                opa: Some(Operand::Number(3.0)),
                opb: None,
            }],
        ));
        let mut vm = machine(program);
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::TypeMismatch {
                context: "RunLine operand A",
                expected: "string",
                got: "number".to_string(),
            })
        );
    }

    #[test]
    fn variadic_count_must_be_integral() {
        let mut library = FunctionTable::new();
        library.register("sum", -1, true, |_| Ok(Value::Number(0.0)));
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::push_number(1.5),
                Instruction::call_func("sum"),
            ],
        ));
        let mut vm = VirtualMachine::new(
            Arc::new(program),
            Recorder::default(),
            MemoryStorage::new(),
            library,
        );
        assert!(matches!(
            vm.run("Start"),
            Err(RuntimeError::TypeMismatch {
                context: "variadic argument count",
                ..
            })
        ));
    }

    #[test]
    fn call_func_discards_result_when_not_returning() {
        let mut library = FunctionTable::new();
        library.register("note", 1, false, |_| Ok(Value::Null));
        let program = Program::new(StringTable::new()).with_node(Node::new(
            "Start",
            vec![
                Instruction::push_number(9.0),
                Instruction::call_func("note"),
                Instruction::stop(),
            ],
        ));
        let mut vm = VirtualMachine::new(
            Arc::new(program),
            Recorder::default(),
            MemoryStorage::new(),
            library,
        );
        vm.run("Start").unwrap();
        assert!(vm.state().stack().is_empty());
    }

    #[test]
    fn unknown_function_is_fatal() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::call_func("nope")]));
        let mut vm = machine(program);
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::UnknownFunction("nope".to_string()))
        );
    }

    #[test]
    fn library_error_is_fatal() {
        let mut library = FunctionTable::new();
        library.register("boom", 0, false, |_| Err("kaboom".to_string()));
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::call_func("boom")]));
        let mut vm = VirtualMachine::new(
            Arc::new(program),
            Recorder::default(),
            MemoryStorage::new(),
            library,
        );
        assert_eq!(
            vm.run("Start"),
            Err(RuntimeError::Library("kaboom".to_string()))
        );
    }

    #[test]
    fn show_options_with_no_options_is_fatal() {
        let program = Program::new(StringTable::new())
            .with_node(Node::new("Start", vec![Instruction::show_options()]));
        let mut vm = machine(program);
        assert!(matches!(
            vm.run("Start"),
            Err(RuntimeError::IllegalState(_))
        ));
    }

    #[test]
    fn empty_node_completes_immediately() {
        let program =
            Program::new(StringTable::new()).with_node(Node::new("Start", vec![]));
        let mut vm = machine(program);
        vm.run("Start").unwrap();
        assert_eq!(
            vm.into_handler().events,
            ["start Start", "complete Start", "done"]
        );
    }
}
