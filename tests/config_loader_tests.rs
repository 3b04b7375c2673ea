use ats_sync::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const KEY_B64: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for (key, _) in env::vars() {
        if key.starts_with("ATS_SYNC_") {
            unsafe {
                env::remove_var(key);
            }
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_with_only_required_settings() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("ATS_SYNC_OPERATOR_TOKEN=op\nATS_SYNC_CRYPTO_KEY={KEY_B64}\n"),
    );

    let cfg = loader(&temp_dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.operator_tokens, vec!["op".to_string()]);
    assert_eq!(cfg.crypto_key.as_deref().map(<[u8]>::len), Some(32));
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.retry.base_delay_ms, 1000);
    assert_eq!(cfg.retry.rate_limit_multiplier, 5);
    assert_eq!(cfg.credentials.expiry_buffer_seconds, 300);
    assert_eq!(cfg.retention.days_to_keep, 30);
    assert_eq!(cfg.sync_trigger_limit_per_minute, 30);
    assert!(cfg.providers.is_empty());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "ATS_SYNC_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "ATS_SYNC_API_BIND_ADDR=192.168.0.10:5000\nATS_SYNC_RETRY_MAX_ATTEMPTS=5\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "ATS_SYNC_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!(
            "ATS_SYNC_PROFILE=test\nATS_SYNC_API_BIND_ADDR=127.0.0.1:4000\nATS_SYNC_OPERATOR_TOKEN=layered\nATS_SYNC_CRYPTO_KEY={KEY_B64}\n"
        ),
    );

    let cfg = loader(&temp_dir).load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.retry.max_attempts, 5);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!(
            "ATS_SYNC_API_BIND_ADDR=127.0.0.1:3000\nATS_SYNC_OPERATOR_TOKEN=from-file\nATS_SYNC_CRYPTO_KEY={KEY_B64}\n"
        ),
    );

    unsafe {
        env::set_var("ATS_SYNC_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("ATS_SYNC_OPERATOR_TOKENS", "one, two ,,three");
    }

    let cfg = loader(&temp_dir).load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.operator_tokens, vec!["one", "two", "three"]);

    clear_env();
}

#[test]
fn provider_settings_are_collected_per_slug() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!(
            "ATS_SYNC_OPERATOR_TOKEN=op\nATS_SYNC_CRYPTO_KEY={KEY_B64}\n\
             ATS_SYNC_HUBSPOT_CLIENT_ID=hs-id\nATS_SYNC_HUBSPOT_CLIENT_SECRET=hs-secret\n\
             ATS_SYNC_WORKDAY_ACCOUNT=acme\nATS_SYNC_GREENHOUSE_WEBHOOK_SECRET=gh-hook\n"
        ),
    );

    let cfg = loader(&temp_dir).load().expect("config loads provider settings");

    let hubspot = cfg.provider("hubspot");
    assert_eq!(hubspot.client_id.as_deref(), Some("hs-id"));
    assert_eq!(hubspot.client_secret.as_deref(), Some("hs-secret"));
    assert_eq!(cfg.provider("workday").account.as_deref(), Some("acme"));
    assert_eq!(
        cfg.provider("greenhouse").webhook_secret.as_deref(),
        Some("gh-hook")
    );
    assert!(cfg.provider("lever").client_id.is_none());
    assert_eq!(cfg.providers.len(), 3);

    let redacted = cfg.redacted_json().unwrap();
    assert!(!redacted.contains("hs-secret"));
    assert!(!redacted.contains("gh-hook"));
    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("ATS_SYNC_API_BIND_ADDR", "not-an-addr");
        env::set_var("ATS_SYNC_OPERATOR_TOKEN", "op");
        env::set_var("ATS_SYNC_CRYPTO_KEY", KEY_B64);
    }
    let err = loader(&temp_dir).load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn missing_or_malformed_crypto_key_is_rejected() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("ATS_SYNC_OPERATOR_TOKEN", "op");
    }
    let err = loader(&temp_dir).load().expect_err("missing key should fail");
    assert!(matches!(err, ConfigError::MissingCryptoKey));

    unsafe {
        env::set_var("ATS_SYNC_CRYPTO_KEY", "not base64!");
    }
    let err = loader(&temp_dir).load().expect_err("bad base64 should fail");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyBase64 { .. }));

    unsafe {
        // 16 bytes
        env::set_var("ATS_SYNC_CRYPTO_KEY", "YWFhYWFhYWFhYWFhYWFhYQ==");
    }
    let err = loader(&temp_dir).load().expect_err("short key should fail");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyLength { length: 16 }));

    clear_env();
}

#[test]
fn out_of_range_retry_settings_are_rejected() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("ATS_SYNC_OPERATOR_TOKEN", "op");
        env::set_var("ATS_SYNC_CRYPTO_KEY", KEY_B64);
        env::set_var("ATS_SYNC_RETRY_MAX_ATTEMPTS", "0");
    }
    let err = loader(&temp_dir).load().expect_err("zero attempts should fail");
    assert!(matches!(err, ConfigError::InvalidRetryAttempts { value: 0 }));

    clear_env();
}
