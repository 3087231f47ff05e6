use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn shaderbg(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shaderbg"));
    command
        .env("SHADERBG_CONFIG_DIR", config_dir)
        .env_remove("SHADERBG_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn missing_shader_file_fails() {
    let root = TempDir::new().unwrap();
    let output = shaderbg(root.path())
        .arg(root.path().join("nope.glsl"))
        .output()
        .expect("failed to run shaderbg");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read shader"), "stderr: {stderr}");
}

#[test]
fn no_shader_anywhere_fails() {
    let root = TempDir::new().unwrap();
    let output = shaderbg(root.path())
        .output()
        .expect("failed to run shaderbg");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no shader given"), "stderr: {stderr}");
}

#[test]
fn invalid_config_fails_before_rendering() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("background.toml");
    fs::write(&config, "version = 7\n").unwrap();

    let output = shaderbg(root.path())
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run shaderbg");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported version"), "stderr: {stderr}");
}

#[test]
fn export_of_broken_shader_fails_without_writing() {
    let root = TempDir::new().unwrap();
    let shader = root.path().join("broken.glsl");
    fs::write(&shader, "void main() {}\n").unwrap();
    let target = root.path().join("frame.png");

    let status = shaderbg(root.path())
        .arg(&shader)
        .arg("--export")
        .arg(&target)
        .arg("--size")
        .arg("32x32")
        .status()
        .expect("failed to run shaderbg");

    assert!(!status.success());
    assert!(!target.exists());
}

#[test]
fn rejects_malformed_size() {
    let root = TempDir::new().unwrap();
    let status = shaderbg(root.path())
        .args(["shader.glsl", "--size", "big"])
        .status()
        .expect("failed to run shaderbg");

    assert!(!status.success());
}

#[test]
fn zero_reload_interval_is_rejected() {
    let root = TempDir::new().unwrap();
    let shader = root.path().join("plasma.glsl");
    fs::write(&shader, "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n").unwrap();
    let config = root.path().join("background.toml");
    fs::write(&config, "version = 1\n[reload]\ninterval = 0\n").unwrap();

    let output = shaderbg(root.path())
        .arg(&shader)
        .arg("--watch")
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run shaderbg");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reload.interval"), "stderr: {stderr}");
}
