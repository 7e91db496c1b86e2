#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn apdulink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_apdulink"))
        .args(["--log-level", "error", "--backend", "mock"])
        .args(args)
        .output()
        .expect("apdulink should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn devices_lists_mock_device_as_json() {
    let output = apdulink(&["--format", "json", "devices"]);

    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("devices output should be json");
    assert_eq!(json["count"], 1);
    assert_eq!(json["devices"][0]["index"], 0);
    assert_eq!(json["devices"][0]["path"], "mock:0");
    assert_eq!(json["devices"][0]["product"], "Mock Device");
}

#[test]
fn devices_count_only() {
    let output = apdulink(&["--format", "pretty", "devices", "--count"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "1");
}

#[test]
fn vendor_filter_excludes_mock_device() {
    let output = apdulink(&["--format", "json", "devices", "--vendor", "2c97"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["count"], 0);
}

#[test]
fn exchange_prints_success_status() {
    let output = apdulink(&["--format", "json", "exchange", "e0 01 00 00 00"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["command"], "e001000000");
    assert_eq!(json["response"], "9000");
    assert_eq!(json["status"], "9000");
    assert_eq!(json["success"], true);
}

#[test]
fn exchange_pretty_output() {
    let output = apdulink(&["--format", "pretty", "exchange", "0xb001000000", "--packet-size", "32"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("=> b001000000"));
    assert!(text.contains("<= 9000"));
    assert!(text.contains("SW 9000 (success)"));
}

#[test]
fn exchange_raw_output_is_response_bytes() {
    let output = apdulink(&["--format", "raw", "exchange", "e001000000"]);
    assert!(output.status.success());
    assert_eq!(output.stdout, vec![0x90, 0x00]);
}

#[test]
fn version_prints_package_version() {
    let output = apdulink(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("apdulink "));

    let output = apdulink(&["version", "--extended"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("backends: "));
}
