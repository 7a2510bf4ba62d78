use assert_cmd::Command;
use discover_check_test_utils::{CarFileBuilder, DriveFixture};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ZERO_PIECE_COMMP: &str = "baga6ea4seaqpy7usqklokfx2vxuynmupslkeutzexe2uqurdg5vhtebhxqmpqmy";

/// The binary with an isolated, absent configuration file
fn discover_check(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("discover-check").unwrap();
    cmd.arg("--config").arg(config_dir.join("config.toml"));
    cmd
}

/// A drive of `count` catalogued 1 KiB archives plus the paths the run needs
fn fixture(count: u64) -> (DriveFixture, PathBuf, PathBuf) {
    let mut fixture = DriveFixture::new().unwrap();
    for seed in 0..count {
        let car = CarFileBuilder::new()
            .with_seed(100 + seed)
            .with_total_size(1024)
            .build();
        fixture.add_car("set-a", &car, Some(5)).unwrap();
    }
    let catalog = fixture.write_catalog().unwrap();
    let reports = fixture.scratch().join("reports");
    (fixture, catalog, reports)
}

fn validate(fixture: &DriveFixture, catalog: &Path, reports: &Path) -> Command {
    let mut cmd = discover_check(fixture.scratch());
    cmd.arg("validate")
        .arg(fixture.root())
        .arg("--any-directory")
        .arg("--drive-id")
        .arg("ZA1TEST")
        .arg("--catalog")
        .arg(catalog)
        .arg("--report-dir")
        .arg(reports)
        .arg("--no-progress");
    cmd
}

fn stored_reports(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn test_version() {
    Command::cargo_bin("discover-check")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("discover-check")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("validate")
                .and(predicate::str::contains("commp"))
                .and(predicate::str::contains("completions")),
        );
}

#[test]
fn test_unknown_argument_is_usage_error() {
    Command::cargo_bin("discover-check")
        .unwrap()
        .args(["validate", "--no-such-flag"])
        .assert()
        .code(2);
}

#[test]
fn test_completions() {
    Command::cargo_bin("discover-check")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("discover-check"));
}

#[test]
fn test_commp_text() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("zeros.bin");
    fs::write(&file, vec![0u8; 2032]).unwrap();

    discover_check(dir.path())
        .arg("commp")
        .arg(&file)
        .arg("--no-progress")
        .assert()
        .success()
        .stdout(predicate::str::contains(ZERO_PIECE_COMMP))
        .stdout(predicate::str::contains("Piece size: 2048"));
}

#[test]
fn test_commp_json() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("zeros.bin");
    fs::write(&file, vec![0u8; 2032]).unwrap();

    let output = discover_check(dir.path())
        .arg("commp")
        .arg(&file)
        .args(["--format", "json", "--no-progress", "--async-hashers", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["commp"], ZERO_PIECE_COMMP);
    assert_eq!(json["payload_size"], 2032);
    assert_eq!(json["piece_size"], 2048);
}

#[test]
fn test_commp_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    discover_check(dir.path())
        .arg("commp")
        .arg(dir.path().join("absent.car"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Not a regular file"));
}

#[test]
fn test_config_path_follows_flag() {
    let dir = TempDir::new().unwrap();
    discover_check(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().to_string_lossy().into_owned(),
        ));
}

#[test]
fn test_config_show_and_layers() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[validator]\nstructure_workers = 7\n",
    )
    .unwrap();

    discover_check(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[validator]"))
        .stdout(predicate::str::contains("structure_workers = 7"));

    discover_check(dir.path())
        .args(["config", "get", "validator.ship_threshold"])
        .env("DISCOVER_CHECK_VALIDATOR__SHIP_THRESHOLD", "17")
        .assert()
        .success()
        .stdout("17\n");

    discover_check(dir.path())
        .args(["config", "get", "validator.missing"])
        .assert()
        .code(2);
}

#[test]
fn test_validate_good_drive() {
    let (fixture, catalog, reports) = fixture(2);

    validate(&fixture, &catalog, &reports)
        .args(["--ship-threshold", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Drive ZA1TEST with 2 CARs is GOOD to ship!",
        ))
        .stdout(predicate::str::contains(
            "\t2\tbelong to dataset\tdumbo-v2-cars-dumbo-internet-archive-prelinger",
        ));

    let stored = stored_reports(&reports);
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("_ZA1TEST_0002_0000_0000.json"));
}

#[test]
fn test_validate_below_threshold_is_busted() {
    let (fixture, catalog, reports) = fixture(1);

    // default threshold
    validate(&fixture, &catalog, &reports)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "!!! DRIVE ZA1TEST IS ***BUSTED*** !!! DO NOT SHIP !!!",
        ));
    // the report is stored regardless of the verdict
    assert_eq!(stored_reports(&reports).len(), 1);
}

#[test]
fn test_validate_unknown_payload_is_busted() {
    let (mut fixture, catalog, reports) = fixture(2);
    let stray = CarFileBuilder::new().with_seed(7).with_block(b"stray".to_vec()).build();
    fixture.add_car("stray", &stray, None).unwrap();

    validate(&fixture, &catalog, &reports)
        .args(["--ship-threshold", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "payload not found in the Filecoin Discover set",
        ))
        .stdout(predicate::str::contains("IS ***BUSTED***"));
}

#[test]
fn test_validate_json_summary() {
    let (fixture, catalog, reports) = fixture(1);

    let output = validate(&fixture, &catalog, &reports)
        .args(["--ship-threshold", "0", "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["drive_identifier"], "ZA1TEST");
    assert_eq!(json["flawless"], 1);
    assert_eq!(json["carfiles"].as_object().unwrap().len(), 1);
}

#[test]
fn test_validate_unstorable_report_fails() {
    let (fixture, catalog, _) = fixture(1);
    // a file where the report directory should be
    let blocked = fixture.scratch().join("blocked");
    fs::write(&blocked, b"").unwrap();

    validate(&fixture, &catalog, &blocked)
        .args(["--ship-threshold", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Report storage FAILED"));
}

#[test]
fn test_validate_without_catalog_is_usage_error() {
    let (fixture, _, reports) = fixture(1);

    discover_check(fixture.scratch())
        .arg("validate")
        .arg(fixture.root())
        .args(["--any-directory", "--drive-id", "ZA1TEST", "--no-progress"])
        .arg("--report-dir")
        .arg(&reports)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No payload catalog configured"));
    assert!(stored_reports(&reports).is_empty());
}

#[test]
fn test_validate_requires_mount_root() {
    let (fixture, catalog, reports) = fixture(1);

    discover_check(fixture.scratch())
        .arg("validate")
        .arg(fixture.root())
        .arg("--catalog")
        .arg(&catalog)
        .arg("--report-dir")
        .arg(&reports)
        .arg("--no-progress")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not the root of a mounted drive"));
}

#[test]
fn test_validate_bad_engine_config_is_usage_error() {
    let (fixture, catalog, reports) = fixture(1);
    fs::write(
        fixture.scratch().join("config.toml"),
        "[engine]\ncollectors = [\"no-such-collector\"]\n",
    )
    .unwrap();

    validate(&fixture, &catalog, &reports)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no-such-collector"));
    assert!(stored_reports(&reports).is_empty());
}

#[test]
fn test_validate_undecodable_cid_aborts() {
    let (fixture, catalog, reports) = fixture(1);
    fs::write(fixture.root().join("set-a/bafyr0000.car"), b"x").unwrap();

    validate(&fixture, &catalog, &reports)
        .args(["--ship-threshold", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Undecodable CID 'bafyr0000'"));
    assert!(stored_reports(&reports).is_empty());
}
