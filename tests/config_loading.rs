use async_ops::config::CONFIG_ENV_VAR;
use async_ops::{Context, Error, OperationPreset, RuntimeConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("async-ops-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_yaml_and_json_files_load_the_same() {
    let dir = scratch_dir();
    let yaml = dir.join("runtime.yaml");
    let json = dir.join("runtime.json");
    std::fs::write(
        &yaml,
        "cache:\n  max_size: 12\npresets:\n  background:\n    retries: 5\n",
    )
    .unwrap();
    std::fs::write(
        &json,
        r#"{"cache": {"max_size": 12}, "presets": {"background": {"retries": 5}}}"#,
    )
    .unwrap();

    let from_yaml = assert_ok!(RuntimeConfig::from_file(&yaml));
    let from_json = assert_ok!(RuntimeConfig::from_file(&json));
    assert_eq!(from_yaml, from_json);
    assert_eq!(from_yaml.preset_options(OperationPreset::Background).retries, 5);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = scratch_dir();
    let path = dir.join("broken.yaml");
    std::fs::write(&path, "batch:\n  batch_size: 0\n").unwrap();

    let err = RuntimeConfig::from_file(&path).unwrap_err();
    match err {
        Error::Configuration { context, .. } => {
            assert_eq!(context.field_path.as_deref(), Some("batch.batch_size"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let missing = assert_err!(RuntimeConfig::from_file(dir.join("absent.yaml")));
    assert!(matches!(missing, Error::Io(_)));

    std::fs::remove_dir_all(&dir).unwrap();
}

// The only test in this binary touching the environment variable.
#[test]
fn test_context_from_env() {
    let dir = scratch_dir();
    let path = dir.join("env.yaml");
    std::fs::write(&path, "presets:\n  quick:\n    timeout_ms: 750\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let ctx = Context::from_env();
    std::env::remove_var(CONFIG_ENV_VAR);

    let ctx = ctx.unwrap();
    let op = ctx.operation::<u8, String>(OperationPreset::Quick);
    assert_eq!(op.options().timeout, Some(Duration::from_millis(750)));

    assert_eq!(RuntimeConfig::from_env().unwrap(), RuntimeConfig::default());
    std::fs::remove_dir_all(&dir).unwrap();
}
