//! Resolved OAuth 2.0 client configuration.

use crate::codec::SecretString;
use crate::store::{AuthStyle, ProviderRecord};

/// Everything needed to send a user to a provider's authorization endpoint
/// and later exchange the code. Built from a stored record with the secret
/// decrypted and endpoint placeholders resolved.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub provider_name: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_url: String,
    pub token_url: String,
    pub auth_style: AuthStyle,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl ClientConfig {
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose()
    }

    /// Build the authorization-code request URL carrying `state`.
    ///
    /// Parameters are appended after any query the endpoint already has.
    pub fn build_auth_url(&self, state: &str) -> String {
        let mut params = vec![format!("client_id={}", urlencoding::encode(&self.client_id))];
        if !self.redirect_url.is_empty() {
            params.push(format!(
                "redirect_uri={}",
                urlencoding::encode(&self.redirect_url)
            ));
        }
        params.push("response_type=code".to_string());
        if !self.scopes.is_empty() {
            params.push(format!(
                "scope={}",
                urlencoding::encode(&self.scopes.join(" "))
            ));
        }
        params.push(format!("state={}", urlencoding::encode(state)));

        let separator = if !self.auth_url.contains('?') {
            "?"
        } else if self.auth_url.ends_with('?') || self.auth_url.ends_with('&') {
            ""
        } else {
            "&"
        };

        format!("{}{}{}", self.auth_url, separator, params.join("&"))
    }
}

/// Substitutes `{id}`, `{name}`, `{client_id}` and `{tenant_id}` in an
/// endpoint template with the record's own (URL-encoded) values.
///
/// Any other `{...}` text is left as written.
pub fn resolve_placeholders(template: &str, record: &ProviderRecord) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    template
        .replace("{id}", &record.id.to_string())
        .replace("{name}", &urlencoding::encode(&record.name))
        .replace("{client_id}", &urlencoding::encode(&record.client_id))
        .replace("{tenant_id}", &urlencoding::encode(&record.tenant_id))
}

/// Splits a space-delimited scope string, dropping empty entries.
pub fn split_scopes(scopes: &str) -> Vec<String> {
    scopes.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_url: &str) -> ClientConfig {
        ClientConfig {
            provider_name: "example".to_string(),
            auth_url: auth_url.to_string(),
            token_url: "https://example.com/oauth/token".to_string(),
            scopes: vec!["read".to_string(), "write".to_string()],
            client_id: "test_client_id".to_string(),
            client_secret: SecretString::new("test_secret"),
            auth_style: AuthStyle::IN_PARAMS,
            redirect_url: "http://localhost:3000/callback".to_string(),
        }
    }

    #[test]
    fn test_build_auth_url() {
        let url = config("https://example.com/oauth/authorize").build_auth_url("random_state");

        assert!(url.starts_with("https://example.com/oauth/authorize?client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        // URL encoding converts spaces to %20
        assert!(url.contains("scope=read%20write"));
        assert!(url.contains("state=random_state"));
        assert!(url.contains("response_type=code"));
        assert!(!url.contains("test_secret"));
    }

    #[test]
    fn test_build_auth_url_keeps_existing_query() {
        let url = config("https://example.com/authorize?prompt=consent").build_auth_url("s");
        assert!(url.starts_with("https://example.com/authorize?prompt=consent&client_id="));
    }

    #[test]
    fn test_state_is_encoded() {
        let url = config("https://example.com/authorize").build_auth_url("a b&c");
        assert!(url.ends_with("state=a%20b%26c"));
    }

    #[test]
    fn test_empty_scopes_and_redirect_are_omitted() {
        let mut cfg = config("https://example.com/authorize");
        cfg.scopes.clear();
        cfg.redirect_url.clear();

        let url = cfg.build_auth_url("s");
        assert!(!url.contains("scope="));
        assert!(!url.contains("redirect_uri="));
    }

    #[test]
    fn test_resolve_placeholders() {
        let mut record = ProviderRecord::new("azure");
        record.id = 12;
        record.client_id = "app id".to_string();
        record.tenant_id = "contoso.onmicrosoft.com".to_string();

        let resolved = resolve_placeholders(
            "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/authorize?app={client_id}&p={id}-{name}&x={unknown}",
            &record,
        );
        assert_eq!(
            resolved,
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/authorize?app=app%20id&p=12-azure&x={unknown}"
        );
    }

    #[test]
    fn test_split_scopes() {
        assert_eq!(split_scopes("  openid  email "), vec!["openid", "email"]);
        assert!(split_scopes("").is_empty());
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", config("https://example.com/authorize"));
        assert!(!debug.contains("test_secret"));
    }
}
