//! Test-plan-driven runs: the plan is the handler.

use std::sync::Arc;

use skein_core::{Instruction, Node, Program, StringRow, StringTable};
use skein_vm::{FunctionTable, MemoryStorage, RuntimeError, TestPlan, VirtualMachine};

fn orchard_strings() -> StringTable {
    let mut table = StringTable::new();
    for (id, text) in [
        ("line:hi", "Hi there"),
        ("line:apples", "Apples"),
        ("line:bananas", "Bananas"),
        ("line:picked_a", "You picked apples"),
        ("line:picked_b", "You picked bananas"),
    ] {
        table.insert(StringRow::new(id, text));
    }
    table
}

/// A menu whose destinations are nodes, reached through `RunNode`.
fn orchard_program() -> Program {
    Program::new(orchard_strings())
        .with_node(Node::new(
            "Start",
            vec![
                Instruction::run_line("line:hi"),
                Instruction::add_option("line:apples", "Apples"),
                Instruction::add_option("line:bananas", "Bananas"),
                Instruction::show_options(),
                Instruction::run_node(),
            ],
        ))
        .with_node(Node::new(
            "Apples",
            vec![
                Instruction::run_line("line:picked_a"),
                Instruction::stop(),
            ],
        ))
        .with_node(Node::new(
            "Bananas",
            vec![
                Instruction::run_line("line:picked_b"),
                Instruction::run_command("fade out"),
                Instruction::stop(),
            ],
        ))
}

fn run_plan(program: Program, plan: &str) -> Result<TestPlan, RuntimeError> {
    let strings = program.strings().clone();
    let handler = TestPlan::parse(plan, strings).expect("plan should parse");
    let mut vm = VirtualMachine::new(
        Arc::new(program),
        handler,
        MemoryStorage::new(),
        FunctionTable::new(),
    );
    vm.run("Start")?;
    Ok(vm.into_handler())
}

#[test]
fn plan_follows_second_option() {
    let plan = run_plan(
        orchard_program(),
        "# pick the second fruit\n\
         line: Hi there\n\
         option: Apples\n\
         option: Bananas\n\
         select: 2\n\
         line: You picked bananas\n\
         command: fade out\n",
    )
    .unwrap();
    plan.verify_complete().unwrap();
}

#[test]
fn plan_follows_first_option() {
    let plan = run_plan(
        orchard_program(),
        "line: Hi there\n\
         option: Apples\n\
         option: Bananas\n\
         select: 1\n\
         line: You picked apples\n",
    )
    .unwrap();
    plan.verify_complete().unwrap();
}

#[test]
fn plan_with_wrong_line_fails_the_run() {
    let err = run_plan(
        orchard_program(),
        "line: Good morning\n",
    )
    .unwrap_err();
    assert!(matches!(err, RuntimeError::Handler(_)));
}

#[test]
fn plan_with_unexpected_event_kind_fails_the_run() {
    // The first event is a line, but the plan expects options.
    let err = run_plan(
        orchard_program(),
        "option: Apples\nselect: 1\n",
    )
    .unwrap_err();
    assert!(matches!(err, RuntimeError::Handler(_)));
}

#[test]
fn plan_left_incomplete_is_detected() {
    let program = Program::new(orchard_strings()).with_node(Node::new(
        "Start",
        vec![Instruction::run_line("line:hi"), Instruction::stop()],
    ));
    let plan = run_plan(
        program,
        "line: Hi there\n\
         line: You picked apples\n",
    )
    .unwrap();
    assert!(plan.verify_complete().is_err());
}

#[test]
fn plan_select_out_of_range_fails_the_run() {
    let err = run_plan(
        orchard_program(),
        "line: Hi there\n\
         option: Apples\n\
         option: Bananas\n\
         select: 9\n",
    )
    .unwrap_err();
    assert!(matches!(err, RuntimeError::Handler(_)));
}
