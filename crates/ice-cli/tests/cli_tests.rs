use std::path::PathBuf;
use std::process::Command;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos")
        .join(name)
}

fn ice_cli() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ice-cli"));
    command.env("RUST_LOG", "warn");
    command
}

#[test]
fn test_demo_stack_runs() {
    let output = ice_cli()
        .arg(demo("two_die.json"))
        .args(["-t", "0.01", "--slot", "0.005", "-p", "core:cpu0=2.0"])
        .output()
        .expect("failed to run ice-cli");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("time ").count(), 2);
    assert!(stdout.contains("core:cpu0"));
    assert!(stdout.contains("dram:banks"));
    assert!(stdout.contains("cooling:outlet0"));
}

#[test]
fn test_unknown_element_fails() {
    let output = ice_cli()
        .arg(demo("two_die.json"))
        .args(["-p", "core:gpu=1.0"])
        .output()
        .expect("failed to run ice-cli");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error (-3)"));
}

#[test]
fn test_bad_arguments() {
    let missing = ice_cli().output().expect("failed to run ice-cli");
    assert_eq!(missing.status.code(), Some(2));

    let bad_option = ice_cli()
        .arg(demo("two_die.json"))
        .args(["--solver", "klu"])
        .output()
        .expect("failed to run ice-cli");
    assert_eq!(bad_option.status.code(), Some(2));
}

#[test]
fn test_dump_directory() {
    let dir = std::env::temp_dir().join(format!("ice-cli-dump-{}", std::process::id()));
    let output = ice_cli()
        .arg(demo("two_die.json"))
        .args(["--storage", "csr", "--precision", "4", "--dump"])
        .arg(&dir)
        .output()
        .expect("failed to run ice-cli");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    for name in ["offsets.txt", "indices.txt", "values.txt", "sources.txt"] {
        assert!(dir.join(name).exists(), "{} missing", name);
    }
    let values = std::fs::read_to_string(dir.join("values.txt")).unwrap();
    let first = values.lines().next().unwrap();
    // d.dddde+XX
    assert_eq!(first.split('e').next().unwrap().trim_start_matches('-').len(), 6);
    std::fs::remove_dir_all(&dir).unwrap();
}
