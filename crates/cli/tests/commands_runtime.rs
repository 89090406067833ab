use std::env;
use std::sync::{Mutex, OnceLock};

use bookworm_cli::commands::{config, doctor, migrate};
use bookworm_core::config::ENV_BINDINGS;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("BOOKWORM_LLM_API_KEY", "sk-test"), ("BOOKWORM_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_api_key() {
    with_env(&[("BOOKWORM_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_after_migrating_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("bookworm.db").display());

    with_env(&[("BOOKWORM_LLM_API_KEY", "sk-test"), ("BOOKWORM_DATABASE_URL", &url)], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1, "schema should be missing before migrate");
        let report = parse_payload(&before.output);
        let schema = find_check(&report, "database_schema");
        assert_eq!(schema["status"], "fail");
        assert!(schema["details"].as_str().unwrap_or_default().contains("bookworm migrate"));

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0);
        assert_eq!(parse_payload(&after.output)["overall_status"], "pass");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_reports_sources_and_redacts_secrets() {
    with_env(
        &[
            ("BOOKWORM_LLM_API_KEY", "sk-live-secret"),
            ("BOOKWORM_CATALOG_API_TOKEN", "Bearer eyJhbGciOi"),
            ("BOOKWORM_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- llm.api_key = sk-*** (source: env (BOOKWORM_LLM_API_KEY))"));
            assert!(output.contains("- catalog.api_token = Bearer ***"));
            assert!(output.contains("- logging.level = debug (source: env (BOOKWORM_LOG_LEVEL))"));
            assert!(output.contains("- server.port = 8000 (source: default)"));
            assert!(!output.contains("sk-live-secret"));
            assert!(!output.contains("eyJhbGciOi"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn find_check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check should be present")
}

/// Runs `test_fn` with only `vars` set among the `BOOKWORM_*` variables,
/// restoring the previous environment afterwards.
fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|p| p.into_inner());

    let saved: Vec<(&str, Option<String>)> = ENV_BINDINGS
        .iter()
        .flat_map(|binding| binding.keys.iter().copied())
        .map(|key| (key, env::var(key).ok()))
        .collect();

    saved.iter().for_each(|(key, _)| env::remove_var(key));
    vars.iter().for_each(|(key, value)| env::set_var(key, value));

    test_fn();

    for (key, previous) in saved {
        match previous {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
