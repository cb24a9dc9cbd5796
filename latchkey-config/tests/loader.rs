use anyhow::Result;
use chrono::Duration;
use latchkey_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, EnvConfig,
};
use latchkey_core::{SameSitePolicy, SingleAccessAllowed, TransportKind};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const PEPPER: &str = "a-pepper-long-enough-for-production-use";
const TOKEN_KEY: &str = "a-token-key-long-enough-for-production-use";

fn write_config(dir: &TempDir, contents: &str) -> Result<PathBuf> {
    let path = dir.path().join("latchkey.toml");
    fs::write(&path, contents)?;
    Ok(path)
}

fn secrets_toml() -> String {
    format!(
        r#"
[auth]
password_pepper = "{PEPPER}"
token_key = "{TOKEN_KEY}"
"#
    )
}

#[test]
fn loads_scopes_from_toml() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        &format!(
            r#"
[server]
host = "127.0.0.1"
port = 8088
{secrets}
[[scopes]]
name = "user"
record_name = "current_user"
transports = ["cookie", "session"]
timeout = "30m"
rotate_persistence_token = true

[scopes.brute_force]
limit = 5
ban_for = "15m"

[scopes.cookie]
same_site = "strict"
sign = true
remember_me_for = "14days"

[[scopes]]
name = "feeds"
transports = ["params"]

[scopes.params]
single_access_allowed = "all"
"#,
            secrets = secrets_toml()
        ),
    )?;

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())?;
    let config = load.config;

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.metadata.config_path, Some(path));
    assert!(!config.metadata.default_scope);

    let user = config.scope("user").expect("user scope");
    assert_eq!(user.record_name, "current_user");
    assert_eq!(
        user.transports,
        vec![TransportKind::Cookie, TransportKind::NativeSession]
    );
    assert_eq!(user.timeout, Some(Duration::minutes(30)));
    assert!(user.rotate_persistence_token);
    assert_eq!(user.brute_force.limit, 5);
    assert_eq!(user.brute_force.ban_for, Duration::minutes(15));
    assert_eq!(user.cookie.same_site, SameSitePolicy::Strict);
    assert!(user.cookie.sign);
    assert_eq!(user.cookie.remember_me_for, Duration::days(14));

    let feeds = config.scope("feeds").expect("feeds scope");
    assert_eq!(feeds.params.single_access_allowed, SingleAccessAllowed::All);

    let registry = config.build_registry()?;
    assert_eq!(registry.scope_names(), vec!["feeds", "user"]);
    config.build_crypto()?;
    Ok(())
}

#[test]
fn environment_overrides_the_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        &format!(
            r#"
[server]
port = 8088
{secrets}
"#,
            secrets = secrets_toml()
        ),
    )?;

    let env = EnvConfig {
        server_port: Some(9000),
        server_host: Some("10.0.0.1".to_string()),
        token_key: Some("another-token-key-that-is-long-enough".to_string()),
        ..EnvConfig::default()
    };
    let config = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env)?
        .config;

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "10.0.0.1");
    assert_eq!(config.auth.password_pepper, PEPPER);
    assert_eq!(config.auth.token_key, "another-token-key-that-is-long-enough");
    Ok(())
}

#[test]
fn config_path_can_come_from_the_environment() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, &secrets_toml())?;

    let env = EnvConfig {
        config_path: Some(path.clone()),
        ..EnvConfig::default()
    };
    let config = ConfigLoader::new().load_with_env(env)?.config;
    assert_eq!(config.metadata.config_path, Some(path));
    Ok(())
}

#[test]
fn missing_explicit_file_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    Ok(())
}

#[test]
fn invalid_values_are_reported_with_their_field() -> Result<()> {
    let dir = TempDir::new()?;

    let path = write_config(
        &dir,
        &format!(
            "{}\n[[scopes]]\nname = \"user\"\ntimeout = \"a while\"\n",
            secrets_toml()
        ),
    )?;
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(
        matches!(&err, ConfigLoadError::InvalidDuration { field, .. } if field == "scopes.user.timeout")
    );

    let path = write_config(
        &dir,
        &format!(
            "{}\n[[scopes]]\nname = \"user\"\ntransports = [\"carrier_pigeon\"]\n",
            secrets_toml()
        ),
    )?;
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::UnknownTransport { .. }));

    let path = write_config(&dir, "[server]\nport = \"eighty\"\n")?;
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }));
    Ok(())
}

#[test]
fn duplicate_scopes_and_transports_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;

    let path = write_config(
        &dir,
        &format!(
            "{}\n[[scopes]]\nname = \"user\"\n[[scopes]]\nname = \"user\"\n",
            secrets_toml()
        ),
    )?;
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::DuplicateScope(name) if name == "user"));

    let path = write_config(
        &dir,
        &format!(
            "{}\n[[scopes]]\nname = \"user\"\ntransports = [\"cookie\", \"cookie\"]\n",
            secrets_toml()
        ),
    )?;
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Registry(_)));
    Ok(())
}

#[test]
fn default_secrets_are_rejected_outside_dev_mode() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[[scopes]]\nname = \"user\"\n")?;

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::WeakSecret {
            field: "LATCHKEY_PASSWORD_PEPPER",
            ..
        })
    ));

    let short = EnvConfig {
        password_pepper: Some(PEPPER.to_string()),
        token_key: Some("short".to_string()),
        ..EnvConfig::default()
    };
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(short)
        .unwrap_err();
    assert!(err.to_string().contains("LATCHKEY_TOKEN_KEY"));
    Ok(())
}

#[test]
fn dev_mode_falls_back_to_defaults_with_warnings() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "dev_mode = true\n")?;
    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())?;

    assert!(load.config.dev_mode);
    assert!(load.config.metadata.default_scope);
    assert_eq!(load.config.scopes.len(), 1);
    assert_eq!(load.config.scopes[0].name, "user");
    assert!(load.config.auth.is_default_pepper());

    let messages: Vec<&str> =
        load.warnings.iter().map(|w| w.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("No scopes configured")));
    assert!(messages.iter().any(|m| m.contains("Default authentication secrets")));
    Ok(())
}

#[test]
fn risky_scope_settings_produce_warnings() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        &format!(
            r#"{secrets}
[[scopes]]
name = "api"
transports = ["params"]
active = false

[scopes.brute_force]
limit = 0

[scopes.http_auth]
request_basic = true
"#,
            secrets = secrets_toml()
        ),
    )?;

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())?;
    let messages: Vec<&str> =
        load.warnings.iter().map(|w| w.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("deactivated")));
    assert!(messages.iter().any(|m| m.contains("Brute force protection")));
    assert!(messages.iter().any(|m| m.contains("requests basic auth")));
    Ok(())
}
