use std::sync::Arc;

use bootloader::{BootConfig, BootError, Bootloader, FileService, boot};
use compiler::ProgramBuilder;
use kernel::{BufferConsole, Kernel, KernelConfig};
use vm::Opcode;

fn kernel() -> (Arc<Kernel>, Arc<BufferConsole>) {
    let console = Arc::new(BufferConsole::new());
    let config = KernelConfig::default()
        .with_arena_bytes(1 << 20)
        .with_workers(1)
        .with_priority_budget(1000)
        .with_heap_bytes(2048)
        .with_stack_bytes(1024)
        .with_console(console.clone());
    (Kernel::new(config).unwrap(), console)
}

#[test]
fn test_locate_missing_image() {
    let dir = tempfile::tempdir().unwrap();
    let files = FileService::new(dir.path());
    let err = files.locate("kernel.img").unwrap_err();
    assert!(matches!(err, BootError::ImageNotFound { ref name, .. } if name == "kernel.img"));
    assert!(!files.exists("kernel.img"));
}

#[test]
fn test_locate_refuses_paths() {
    let dir = tempfile::tempdir().unwrap();
    let files = FileService::new(dir.path());
    for name in ["", "..", "../etc/passwd", "a/b"] {
        assert!(matches!(files.locate(name), Err(BootError::InvalidName(_))), "{name}");
    }
}

#[test]
fn test_store_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let files = FileService::new(dir.path().join("images"));
    files.store("prog", &[1, 2, 3]).unwrap();
    assert!(files.exists("prog"));
    assert_eq!(files.load("prog").unwrap(), vec![1, 2, 3]);

    files.store("empty", &[]).unwrap();
    assert!(matches!(files.load("empty"), Err(BootError::EmptyImage(_))));
}

#[test]
fn test_boot_runs_image_as_root() {
    let dir = tempfile::tempdir().unwrap();
    let image = ProgramBuilder::new()
        .push(4)
        .push(8)
        .op(Opcode::Mul)
        .print_str("booted")
        .build()
        .unwrap();
    FileService::new(dir.path()).store("kernel.img", &image).unwrap();

    let (kernel, console) = kernel();
    let root = boot(&kernel, dir.path(), "kernel.img").unwrap();
    kernel.run_until_idle(10);

    let process = kernel.process(root).unwrap();
    assert_eq!(process.name(), b"kernel.img".to_vec());
    assert_eq!(process.stack_snapshot().unwrap(), vec![32]);
    assert_eq!(console.lines_from(root), vec!["booted"]);
}

#[test]
fn test_boot_missing_image_reports_context() {
    let dir = tempfile::tempdir().unwrap();
    let (kernel, _) = kernel();
    let err = Bootloader::new(dir.path()).boot(&kernel).unwrap_err();

    assert!(err.to_string().contains("kernel.img"));
    assert!(matches!(err.downcast_ref::<BootError>(), Some(BootError::ImageNotFound { .. })));
    assert_eq!(kernel.process_count(), 0);
}

#[test]
fn test_boot_falls_back_to_builtin_image() {
    let dir = tempfile::tempdir().unwrap();
    let (kernel, console) = kernel();
    let config = BootConfig {
        fallback: true,
        root_priority: 40,
        ..BootConfig::default()
    };
    let root = Bootloader::with_config(dir.path(), config).boot(&kernel).unwrap();
    kernel.run_until_idle(10);

    assert_eq!(kernel.process(root).unwrap().priority(), 40);
    assert_eq!(console.lines().len(), 1);
}

#[test]
fn test_failed_dispatch_leaves_no_process() {
    let dir = tempfile::tempdir().unwrap();
    FileService::new(dir.path()).store("kernel.img", &[Opcode::Pop.as_u8()]).unwrap();
    let (kernel, _) = kernel();
    kernel.workers()[0].hang();

    let err = boot(&kernel, dir.path(), "kernel.img").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<kernel::KernelError>(),
        Some(kernel::KernelError::NoWorkerAvailable)
    ));
    assert_eq!(kernel.process_count(), 0);
}
