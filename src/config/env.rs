use super::{KeyConfig, VaultConfig};
use tracing::warn;

/// Id given to a key supplied through `IDP_VAULT_ENCRYPTION_KEY` without
/// `IDP_VAULT_ENCRYPTION_KEY_ID`.
pub const DEFAULT_ENV_KEY_ID: &str = "env";

/// Applies environment variable overrides on top of file configuration.
///
/// Unparseable values are ignored and the file value is kept.
pub fn apply_env_overrides(config: &mut VaultConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

fn apply_overrides<F>(config: &mut VaultConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var("IDP_VAULT_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = var("IDP_VAULT_ADMIN_TOKEN") {
        config.server.admin_token = Some(v).filter(|t| !t.is_empty());
    }
    if let Some(v) = var("IDP_VAULT_DB_PATH") {
        config.database.path = v;
    }
    if let Some(v) = var("IDP_VAULT_MIGRATE_ON_START") {
        match v.parse::<bool>() {
            Ok(b) => config.encryption.migrate_on_start = b,
            Err(_) => warn!(value = %v, "Ignoring invalid IDP_VAULT_MIGRATE_ON_START"),
        }
    }
    if let Some(v) = var("IDP_VAULT_DEFAULT_REDIRECT_URL") {
        config.login.default_redirect_url = Some(v);
    }

    // An env key becomes the active key, alongside any file keys
    if let Some(key) = var("IDP_VAULT_ENCRYPTION_KEY") {
        let id = var("IDP_VAULT_ENCRYPTION_KEY_ID")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_ENV_KEY_ID.to_string());
        config.encryption.keys.retain(|k| k.id != id);
        config.encryption.keys.push(KeyConfig {
            id: id.clone(),
            key,
        });
        config.encryption.active_key_id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_no_env_keeps_config() {
        let mut config = VaultConfig::default();
        apply_overrides(&mut config, vars(&[]));
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert!(config.encryption.keys.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = VaultConfig::default();
        apply_overrides(
            &mut config,
            vars(&[
                ("IDP_VAULT_BIND_ADDR", "127.0.0.1:1234"),
                ("IDP_VAULT_ADMIN_TOKEN", "tok"),
                ("IDP_VAULT_DB_PATH", "/tmp/p.db"),
                ("IDP_VAULT_MIGRATE_ON_START", "true"),
            ]),
        );
        assert_eq!(config.server.bind_addr, "127.0.0.1:1234");
        assert_eq!(config.server.admin_token.as_deref(), Some("tok"));
        assert_eq!(config.database.path, "/tmp/p.db");
        assert!(config.encryption.migrate_on_start);
    }

    #[test]
    fn test_invalid_bool_is_ignored() {
        let mut config = VaultConfig::default();
        apply_overrides(&mut config, vars(&[("IDP_VAULT_MIGRATE_ON_START", "yes please")]));
        assert!(!config.encryption.migrate_on_start);
    }

    #[test]
    fn test_env_key_becomes_active() {
        let mut config = VaultConfig::default();
        config.encryption.keys.push(KeyConfig {
            id: "file".to_string(),
            key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
        });

        apply_overrides(
            &mut config,
            vars(&[
                ("IDP_VAULT_ENCRYPTION_KEY", "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE="),
                ("IDP_VAULT_ENCRYPTION_KEY_ID", "2026-10"),
            ]),
        );

        assert_eq!(config.encryption.keys.len(), 2);
        let keyring = config.encryption.keyring().unwrap();
        assert_eq!(keyring.active_key_id(), "2026-10");
        assert_eq!(keyring.key_ids(), vec!["2026-10".to_string(), "file".to_string()]);
    }

    #[test]
    fn test_env_key_default_id() {
        let mut config = VaultConfig::default();
        apply_overrides(
            &mut config,
            vars(&[("IDP_VAULT_ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")]),
        );
        assert_eq!(config.encryption.active_key_id.as_deref(), Some(DEFAULT_ENV_KEY_ID));
    }
}
