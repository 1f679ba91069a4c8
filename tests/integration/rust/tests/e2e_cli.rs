//! End-to-end runs of the command-line launcher over a real directory

use bridge::{BridgeError, EnvironmentParams};
use bridge_cli::{Cli, CliError, Launcher};
use clap::Parser;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("data/levels")).unwrap();
    fs::write(
        dir.path().join("data/levels/intro.json"),
        r#"{"name": "intro", "waves": [3, 5], "boss": null}"#,
    )
    .unwrap();
    fs::write(dir.path().join("data/title.json"), r#""Corridors""#).unwrap();
    dir
}

fn launcher(dir: &TempDir) -> Launcher {
    integration_tests::init_logging();
    let root = dir.path().join("data");
    Launcher::new(EnvironmentParams::default().with_search_path(root.to_string_lossy())).unwrap()
}

/// Test: a nested data module comes back as JSON
#[test]
fn test_run_nested_json_module() {
    let dir = project();
    let launcher = launcher(&dir);

    let exports = launcher.run("levels/intro", 0).unwrap();

    assert_eq!(exports["name"], "intro");
    let waves: Vec<f64> = exports["waves"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    assert_eq!(waves, vec![3.0, 5.0]);
    assert_eq!(exports["boss"], Value::Null);
    assert_eq!(launcher.statistics().modules, 1);
}

/// Test: primitive exports and repeated runs share the module cache
#[test]
fn test_rerun_uses_cache() {
    let dir = project();
    let launcher = launcher(&dir);

    assert_eq!(launcher.run("title", 3).unwrap(), Value::from("Corridors"));
    fs::write(dir.path().join("data/title.json"), r#""Changed""#).unwrap();
    assert_eq!(launcher.run("title", 0).unwrap(), Value::from("Corridors"));
    assert_eq!(launcher.statistics().modules, 1);
}

/// Test: the bridge module reports the version
#[test]
fn test_run_bridge_module() {
    let dir = project();
    let launcher = launcher(&dir);

    let exports = launcher.run("jsb", 1).unwrap();
    assert!(exports["version"].is_string());
    assert_eq!(launcher.statistics().pending_deletions, 0);
}

/// Test: a missing module is reported through the CLI error
#[test]
fn test_run_missing_module() {
    let dir = project();
    let launcher = launcher(&dir);

    assert!(matches!(
        launcher.run("levels/outro", 0),
        Err(CliError::Bridge(BridgeError::UnknownModule(id))) if id == "levels/outro"
    ));
    assert_eq!(launcher.statistics().modules, 0);
}

/// Test: parsed arguments drive the launcher
#[test]
fn test_from_parsed_arguments() {
    let dir = project();
    let root = dir.path().join("data");
    let config = dir.path().join("env.json");
    fs::write(&config, r#"{"max_call_depth": 64}"#).unwrap();
    let root = root.to_string_lossy().into_owned();
    let config_path = config.to_string_lossy().into_owned();

    let cli = Cli::try_parse_from([
        "bridge-run",
        "--config",
        config_path.as_str(),
        "-p",
        root.as_str(),
        "--frames",
        "2",
        "levels/intro",
    ])
    .unwrap();
    let launcher = Launcher::from_cli(&cli).unwrap();

    assert_eq!(launcher.environment().params().max_call_depth, 64);
    assert_eq!(launcher.environment().params().search_paths, vec![root]);
    let exports = launcher.run(&cli.module, cli.frames).unwrap();
    assert_eq!(exports["name"], "intro");
}
