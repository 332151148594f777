use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn reisekosten_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("reisekosten"))
}

fn init_config(config_path: &Path) {
    reisekosten_cmd()
        .args(["-C", config_path.to_str().unwrap(), "init"])
        .assert()
        .success();
}

fn run_in(config_path: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    reisekosten_cmd()
        .args(["-C", config_path.to_str().unwrap()])
        .args(args)
        .assert()
}

#[test]
fn test_help() {
    reisekosten_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Travel expense reports"));
}

#[test]
fn test_version() {
    reisekosten_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("reisekosten"));
}

#[test]
fn test_init_creates_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");

    reisekosten_cmd()
        .args(["-C", config_path.to_str().unwrap(), "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized reisekosten config"));

    assert!(config_path.join("config.toml").exists());
    assert!(config_path.join("form.toml").exists());
    assert!(config_path.join("output").is_dir());
}

#[test]
fn test_init_fails_if_exists() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");

    init_config(&config_path);

    reisekosten_cmd()
        .args(["-C", config_path.to_str().unwrap(), "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_status_without_init() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nonexistent");

    run_in(&config_path, &["status"])
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_status_lists_missing_fields() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["status"])
        .success()
        .stdout(predicate::str::contains("Missing before export"))
        .stdout(predicate::str::contains("purpose"));
}

#[test]
fn test_set_and_totals() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["set", "trip.distance_km", "100"]).success();
    run_in(&config_path, &["set", "trip.rail", "10"]).success();

    run_in(&config_path, &["totals"])
        .success()
        .stdout(predicate::str::contains("Fahrtkosten"))
        .stdout(predicate::str::contains("40,00\u{a0}€"));
}

#[test]
fn test_set_decimal_comma_is_stored_as_text() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["set", "lodging.actual_cost", "89,50"]).success();

    let form = fs::read_to_string(config_path.join("form.toml")).unwrap();
    assert!(form.contains("actual_cost = \"89,50\""));

    run_in(&config_path, &["totals"])
        .success()
        .stdout(predicate::str::contains("89,50\u{a0}€"));
}

#[test]
fn test_set_start_date_derives_week() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["set", "basis.start_date", "2025-12-29"])
        .success()
        .stdout(predicate::str::contains("1/2026"));

    let form = fs::read_to_string(config_path.join("form.toml")).unwrap();
    assert!(form.contains("calendar_week = \"1/2026\""));
}

#[test]
fn test_set_unknown_field_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["set", "trip.bicycle", "3"])
        .failure()
        .stderr(predicate::str::contains("Unknown form field"));
}

#[test]
fn test_misc_add_list_remove() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["misc", "add", "Parkgebühr", "12,50"])
        .success()
        .stdout(predicate::str::contains("Added expense #1"));
    run_in(&config_path, &["misc", "add", "Maut", "7"])
        .success()
        .stdout(predicate::str::contains("Added expense #2"));

    run_in(&config_path, &["misc", "list"])
        .success()
        .stdout(predicate::str::contains("Parkgebühr"))
        .stdout(predicate::str::contains("Maut"));

    run_in(&config_path, &["misc", "remove", "1"])
        .success()
        .stdout(predicate::str::contains("Parkgebühr"));

    run_in(&config_path, &["misc", "list"])
        .success()
        .stdout(predicate::str::contains("Parkgebühr").not());

    run_in(&config_path, &["misc", "remove", "9"])
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_attach_skips_unsupported_types() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    let receipt = temp_dir.path().join("beleg.pdf");
    let notes = temp_dir.path().join("notizen.txt");
    fs::write(&receipt, b"%PDF-1.4\n").unwrap();
    fs::write(&notes, "hello").unwrap();

    run_in(
        &config_path,
        &[
            "attach",
            receipt.to_str().unwrap(),
            notes.to_str().unwrap(),
        ],
    )
    .success()
    .stdout(predicate::str::contains("Attached beleg.pdf (application/pdf)"))
    .stdout(predicate::str::contains("Skipped 1 file"));

    run_in(&config_path, &["attachments"])
        .success()
        .stdout(predicate::str::contains("beleg.pdf"))
        .stdout(predicate::str::contains("notizen.txt").not());
}

#[test]
fn test_attach_with_declared_type() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    let scan = temp_dir.path().join("scan.bin");
    fs::write(&scan, b"\x89PNG").unwrap();

    run_in(
        &config_path,
        &["attach", "--type", "image/png", scan.to_str().unwrap()],
    )
    .success()
    .stdout(predicate::str::contains("Attached scan.bin (image/png)"));
}

#[test]
fn test_detach() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    let receipt = temp_dir.path().join("hotel.pdf");
    fs::write(&receipt, b"%PDF-1.4\n").unwrap();
    run_in(&config_path, &["attach", receipt.to_str().unwrap()]).success();

    run_in(&config_path, &["detach", "2"])
        .failure()
        .stderr(predicate::str::contains("Invalid attachment index"));

    run_in(&config_path, &["detach", "1"])
        .success()
        .stdout(predicate::str::contains("Removed attachment hotel.pdf"));

    run_in(&config_path, &["attachments"])
        .success()
        .stdout(predicate::str::contains("No attachments."));
}

#[test]
fn test_week() {
    reisekosten_cmd()
        .args(["week", "2025-12-29"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/2026"));

    reisekosten_cmd()
        .args(["week", "29.12.2025"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected YYYY-MM-DD"));
}

#[test]
fn test_export_requires_basis_fields() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    init_config(&config_path);

    run_in(&config_path, &["set", "basis.name", "Erika Mustermann"]).success();

    run_in(&config_path, &["export"])
        .failure()
        .stderr(predicate::str::contains("Required fields missing"))
        .stderr(predicate::str::contains("purpose"));
}

#[test]
fn test_export_failure_is_reported_once() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rk-config");
    let empty_path = temp_dir.path().join("no-bin");
    fs::create_dir(&empty_path).unwrap();
    init_config(&config_path);

    for (field, value) in [
        ("basis.name", "Erika Mustermann"),
        ("basis.purpose", "Kundentermin"),
        ("basis.start_date", "2025-03-03"),
        ("basis.end_date", "2025-03-04"),
        ("basis.company", "Beispiel GmbH"),
    ] {
        run_in(&config_path, &["set", field, value]).success();
    }

    // typst cannot be found, so the snapshot step fails
    reisekosten_cmd()
        .args(["-C", config_path.to_str().unwrap(), "export"])
        .env("PATH", &empty_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Error: PDF-Erzeugung fehlgeschlagen: Typst not found",
        ))
        .stderr(predicate::str::contains("Failed to generate PDF").not());
}
