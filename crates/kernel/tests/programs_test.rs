mod common;

use common::test_kernel;
use compiler::{ProgramBuilder, assemble};
use once_cell::sync::Lazy;
use vm::Opcode;

#[derive(Debug)]
pub struct TestCase {
    pub name: &'static str,
    pub code: Vec<u8>,
    pub expected_stack: Vec<i64>,
    pub expected_output: Vec<&'static str>,
}

pub static TEST_CASES: Lazy<Vec<TestCase>> = Lazy::new(|| {
    vec![
        TestCase {
            name: "multiply",
            code: ProgramBuilder::new().push(4).push(8).op(Opcode::Mul).build().unwrap(),
            expected_stack: vec![32],
            expected_output: vec![],
        },
        TestCase {
            name: "left operand is popped first",
            code: ProgramBuilder::new().push(3).push(10).op(Opcode::Sub).build().unwrap(),
            expected_stack: vec![7],
            expected_output: vec![],
        },
        TestCase {
            name: "long literal",
            code: ProgramBuilder::new().lpsh(1 << 40).push(1).op(Opcode::Add).build().unwrap(),
            expected_stack: vec![(1 << 40) + 1],
            expected_output: vec![],
        },
        TestCase {
            name: "print literal",
            code: ProgramBuilder::new().print_str("hi").build().unwrap(),
            expected_stack: vec![],
            expected_output: vec!["hi"],
        },
        TestCase {
            name: "jump over",
            code: ProgramBuilder::new()
                .jump("skip")
                .print_str("never")
                .label("skip")
                .print_str("after")
                .build()
                .unwrap(),
            expected_stack: vec![],
            expected_output: vec!["after"],
        },
        TestCase {
            name: "comparison chain",
            code: assemble(
                "
                push 2
                push 5
                cmpg        ; 5 > 2
                push 0
                push 0
                equals      ; 0 == 0
                logand
                ",
            )
            .unwrap(),
            expected_stack: vec![1],
            expected_output: vec![],
        },
        TestCase {
            name: "assembled greeting",
            code: assemble(
                r#"
                apush "hello, world"
                print
                push 1
                pop
                "#,
            )
            .unwrap(),
            expected_stack: vec![],
            expected_output: vec!["hello, world"],
        },
        TestCase {
            name: "empty literal prints nothing",
            code: ProgramBuilder::new().apush(b"").op(Opcode::Print).build().unwrap(),
            expected_stack: vec![],
            expected_output: vec![""],
        },
    ]
});

#[test]
fn test_program_cases() {
    for case in TEST_CASES.iter() {
        let (kernel, console) = test_kernel();
        let process = kernel.generate_process(None).unwrap();
        process.bind_program(&case.code).unwrap();
        kernel.execute_process(process.id()).unwrap();
        kernel.run_until_idle(100);

        assert_eq!(process.stack_snapshot().unwrap(), case.expected_stack, "{}", case.name);
        assert_eq!(console.lines(), case.expected_output, "{}", case.name);
        assert!(!process.is_halted(), "{}", case.name);
    }
}

#[test]
fn test_spawn_bind_and_dispatch_child() {
    let (kernel, console) = test_kernel();
    let root = kernel.generate_process(None).unwrap();
    // The root is pid 0, so its first child is pid 1.
    let code = ProgramBuilder::new()
        .spawn(25, b"worker")
        .procfun("child")
        .push(1)
        .prce()
        .print_str("parent")
        .jump("end")
        .label("child")
        .print_str("child")
        .label("end")
        .build()
        .unwrap();
    root.bind_program(&code).unwrap();
    kernel.execute_process(root.id()).unwrap();

    kernel.run_until_idle(10);

    let child = kernel.process(types::ProcessId::new(1)).unwrap();
    assert_eq!(child.priority(), 25);
    assert_eq!(child.name(), b"worker".to_vec());
    assert_eq!(root.children(), vec![child.id()]);
    assert_eq!(console.lines_from(root.id()), vec!["parent"]);
    assert_eq!(console.lines_from(child.id()), vec!["child"]);
    assert!(child.is_idle());
}

#[test]
fn test_child_shares_parent_image() {
    let (kernel, _) = test_kernel();
    let root = kernel.generate_process(None).unwrap();
    let code = ProgramBuilder::new()
        .spawn(10, b"")
        .procfun("child")
        .jump("end")
        .label("child")
        .push(9)
        .label("end")
        .build()
        .unwrap();
    root.bind_program(&code).unwrap();
    kernel.execute_process(root.id()).unwrap();
    kernel.run_until_idle(10);

    let before = common::live_allocations(&kernel);
    kernel.halt_process(root.id()).unwrap();
    // The image stays alive while the child still holds it.
    let child = kernel.process(types::ProcessId::new(1)).unwrap();
    assert!(child.is_bound());
    assert_eq!(common::live_allocations(&kernel), before - 2);

    kernel.halt_process(child.id()).unwrap();
    assert_eq!(common::live_allocations(&kernel), 0);
}

#[test]
fn test_procfun_rejects_entry_past_end() {
    let (kernel, _) = test_kernel();
    let root = kernel.generate_process(None).unwrap();
    let code = ProgramBuilder::new().spawn(10, b"").procfun_at(500).build().unwrap();
    root.bind_program(&code).unwrap();

    let outcome = root.execute(&kernel, 100);
    assert!(matches!(
        outcome,
        kernel::Quantum::Faulted(vm::ExecutionError::InvalidJump { target: 500, .. })
    ));
    assert_eq!(kernel.process_count(), 0);
}
