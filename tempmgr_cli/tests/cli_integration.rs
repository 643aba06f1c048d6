use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[machine]
hotend_count = 1
has_bed_pid = true
has_ambient = true
fan_soft_pwm_bits = 4
has_model = true

[limits]
hotend_max_c = 305
bed_max_c = 150

[pid]
kp = 40.0
ki = 7.0
kd = 60.0

[runaway]
hotend_timeout_s = 45
bed_timeout_s = 360
"#;
    let path = dir.path().join("tempmgr.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(toml.as_bytes()).unwrap();
    path
}

fn cmd() -> Command {
    Command::cargo_bin("tempmgr").unwrap()
}

#[test]
fn heat_streams_report_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("s.store"))
        .arg("--accel")
        .args(["heat", "--hotend", "210", "--seconds", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("T:").and(predicate::str::contains("B:")));
}

#[test]
fn pid_autotune_reports_gains() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("s.store"))
        .arg("--accel")
        .args(["pid-autotune", "--target", "210", "--cycles", "3"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("PID Autotune start")
                .and(predicate::str::contains(" bias: "))
                .and(predicate::str::contains(" Kp: "))
                .and(predicate::str::contains("finished")),
        );
}

#[test]
fn model_set_reports_the_new_values() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut set = cmd();
    set.arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("s.store"))
        .args(["model", "set", "--c", "11.5", "--p", "38.0"]);
    for i in 0..16 {
        set.args(["--r", &format!("{i}=18.0")]);
    }
    set.assert()
        .success()
        .stdout(predicate::str::contains("C:11.50").and(predicate::str::contains("R[15]:18.00")));
}

#[test]
fn model_save_then_load_round_trips_through_the_store() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let store = dir.path().join("s.store");

    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(&store)
        .args(["model", "save"])
        .assert()
        .success();
    assert!(store.exists(), "store file written");

    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(&store)
        .args(["model", "load"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TM: P:"));
}

#[rstest]
#[case("report")]
#[case("reset")]
fn model_queries_print_settings(#[case] sub: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("s.store"))
        .args(["model", sub])
        .assert()
        .success()
        .stdout(predicate::str::contains("TM: R[0]:").and(predicate::str::contains("TM: P:")));
}

#[test]
fn uncalibrated_enable_is_refused() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("s.store"))
        .args(["model", "enable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cannot enable"));
}

#[test]
fn invalid_config_fails_with_guidance() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[machine]\nhotend_count = 9\n").unwrap();
    cmd()
        .arg("--config")
        .arg(&path)
        .args(["model", "report"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hotend_count"));
}

#[test]
fn bad_heater_is_a_clean_failure() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    cmd()
        .arg("--config")
        .arg(&cfg)
        .arg("--accel")
        .args(["pid-autotune", "--heater", "hotend2", "--target", "210"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Heater index"));
}
