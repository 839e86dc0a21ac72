use assert_cmd::cargo;
use rstest::rstest;
use std::path::PathBuf;

const SCRIPT: &str = "total = 0
for i in range(4):
    total += i
print(total)
";

fn create_script(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("main.qs");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_exec() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let script = create_script(&dir, SCRIPT);

    let mut cmd = cargo::cargo_bin_cmd!("qdb");
    cmd.arg("exec").arg(&script).assert().success().code(0).stdout("6\n");

    Ok(())
}

#[test]
fn test_exec_uncaught_exception() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let script = create_script(&dir, "x = [1]\nprint(x[3])\n");

    let mut cmd = cargo::cargo_bin_cmd!("qdb");
    let output = cmd.arg("exec").arg(&script).assert().failure().get_output().clone();

    assert!(String::from_utf8_lossy(&output.stderr).contains("IndexError"));
    Ok(())
}

#[rstest]
#[case::continue_to_end("c\n", "6\n")]
#[case::breakpoint_and_print("b 3, i == 2\nc\np total * 100\ncl\nc\n", "100\n")]
#[case::step_into_first_line("s\nn\nn\np i + 40\nc\n", "40\n")]
#[case::list_source("l\nc\n", "[EOF]\n")]
fn test_run_with_piped_commands(#[case] input: &str, #[case] expected: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let script = create_script(&dir, SCRIPT);

    let mut cmd = cargo::cargo_bin_cmd!("qdb");
    let output = cmd
        .env("QDB_CONFIG_DIR", dir.path())
        .arg("run")
        .arg(&script)
        .write_stdin(input)
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(expected), "{}", stdout);
    assert!(stdout.ends_with("The program finished\n"), "{}", stdout);
    Ok(())
}

#[test]
fn test_run_quit_before_start() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let script = create_script(&dir, SCRIPT);

    let mut cmd = cargo::cargo_bin_cmd!("qdb");
    let output = cmd
        .env("QDB_CONFIG_DIR", dir.path())
        .arg("run")
        .arg(&script)
        .write_stdin("q\n")
        .assert()
        .success()
        .get_output()
        .clone();

    assert!(!String::from_utf8_lossy(&output.stdout).contains("6\n"));
    Ok(())
}

#[test]
fn test_missing_script() {
    let mut cmd = cargo::cargo_bin_cmd!("qdb");
    cmd.arg("run").arg("does-not-exist.qs").assert().failure();
}
