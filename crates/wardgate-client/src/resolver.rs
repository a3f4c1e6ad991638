//! Picks the token and password an outbound gateway call sends.
//!
//! Precedence, first match wins:
//!
//! 1. explicit credentials, when either field is non-blank;
//! 2. a destination URL override, which yields no credentials;
//! 3. the configured gateway mode:
//!    - `remote`: `gateway.remote`, then the environment, then `gateway.auth`
//!      (the password order can be switched to environment first);
//!    - `local`: the environment, then `gateway.auth`.
//!
//! Each field is resolved independently and blank values count as absent.

use crate::env::{env_password, env_token, EnvSource};
use std::fmt;
use wardgate_core::credentials::first_present;
use wardgate_core::{normalize, GatewayMode, GatewayPolicyConfig};

/// Credentials supplied directly by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplicitCredentials {
    /// Token to send.
    pub token: Option<String>,
    /// Password to send.
    pub password: Option<String>,
}

impl ExplicitCredentials {
    /// Borrowed values are copied as-is; trimming happens on resolve.
    pub fn new(token: Option<&str>, password: Option<&str>) -> Self {
        Self {
            token: token.map(ToOwned::to_owned),
            password: password.map(ToOwned::to_owned),
        }
    }
}

/// The credentials to send. Both fields may be absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    /// Gateway token, trimmed.
    pub token: Option<String>,
    /// Gateway password, trimmed.
    pub password: Option<String>,
}

impl ResolvedCredentials {
    /// True when neither secret resolved.
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.password.is_none()
    }
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Password order in remote mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemotePasswordPrecedence {
    /// `gateway.remote.password`, then environment, then `gateway.auth.password`.
    #[default]
    RemoteFirst,
    /// Environment, then `gateway.remote.password`, then `gateway.auth.password`.
    EnvFirst,
}

/// Resolve the credentials for one outbound call. Never fails.
///
/// The environment is read at call time through `env`.
pub fn resolve_gateway_credentials<E: EnvSource + ?Sized>(
    policy: &GatewayPolicyConfig,
    env: &E,
    explicit: Option<&ExplicitCredentials>,
    url_override: Option<&str>,
    precedence: RemotePasswordPrecedence,
) -> ResolvedCredentials {
    if let Some(explicit) = explicit {
        let token = normalize(explicit.token.as_deref());
        let password = normalize(explicit.password.as_deref());
        if token.is_some() || password.is_some() {
            return ResolvedCredentials { token, password };
        }
    }

    // Configured secrets are never sent to an overridden destination.
    if normalize(url_override).is_some() {
        return ResolvedCredentials::default();
    }

    let env_token = env_token(env);
    let env_password = env_password(env);
    let auth = &policy.auth;

    match policy.mode {
        GatewayMode::Remote => {
            let remote = &policy.remote;
            let token = first_present([
                remote.token.as_deref(),
                env_token.as_deref(),
                auth.token.as_deref(),
            ]);
            let password = match precedence {
                RemotePasswordPrecedence::RemoteFirst => first_present([
                    remote.password.as_deref(),
                    env_password.as_deref(),
                    auth.password.as_deref(),
                ]),
                RemotePasswordPrecedence::EnvFirst => first_present([
                    env_password.as_deref(),
                    remote.password.as_deref(),
                    auth.password.as_deref(),
                ]),
            };
            ResolvedCredentials { token, password }
        }
        GatewayMode::Local => ResolvedCredentials {
            token: first_present([env_token.as_deref(), auth.token.as_deref()]),
            password: first_present([env_password.as_deref(), auth.password.as_deref()]),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::env::{LEGACY_TOKEN_VAR, PASSWORD_VAR, TOKEN_VAR};
    use std::collections::HashMap;
    use wardgate_core::{GatewayAuthConfig, GatewayRemoteConfig};

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn policy(mode: GatewayMode) -> GatewayPolicyConfig {
        GatewayPolicyConfig {
            mode,
            auth: GatewayAuthConfig {
                token: some("config-token"),
                password: some("config-password"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn with_remote(
        mut policy: GatewayPolicyConfig,
        token: &str,
        password: &str,
    ) -> GatewayPolicyConfig {
        policy.remote = GatewayRemoteConfig {
            url: some("wss://gateway.example/ws"),
            token: some(token),
            password: some(password),
        };
        policy
    }

    fn env(token: Option<&str>, password: Option<&str>) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        if let Some(token) = token {
            vars.insert(TOKEN_VAR.to_string(), token.to_string());
        }
        if let Some(password) = password {
            vars.insert(PASSWORD_VAR.to_string(), password.to_string());
        }
        vars
    }

    fn resolve(
        policy: &GatewayPolicyConfig,
        vars: &HashMap<String, String>,
        explicit: Option<&ExplicitCredentials>,
        url_override: Option<&str>,
    ) -> ResolvedCredentials {
        resolve_gateway_credentials(
            policy,
            vars,
            explicit,
            url_override,
            RemotePasswordPrecedence::RemoteFirst,
        )
    }

    #[test]
    fn test_explicit_pair_wins_over_everything() {
        let explicit = ExplicitCredentials::new(Some("explicit-token"), Some("explicit-password"));
        let resolved = resolve(
            &policy(GatewayMode::Local),
            &env(Some("env-token"), None),
            Some(&explicit),
            None,
        );
        assert_eq!(resolved.token, some("explicit-token"));
        assert_eq!(resolved.password, some("explicit-password"));
    }

    #[test]
    fn test_explicit_token_alone_drops_other_sources() {
        let explicit = ExplicitCredentials::new(Some("explicit-token"), None);
        let remote = with_remote(policy(GatewayMode::Remote), "remote-token", "remote-password");
        let resolved = resolve(
            &remote,
            &env(Some("env-token"), Some("env-password")),
            Some(&explicit),
            Some("wss://elsewhere/ws"),
        );
        assert_eq!(resolved.token, some("explicit-token"));
        assert_eq!(resolved.password, None);
    }

    #[test]
    fn test_blank_explicit_falls_through() {
        let explicit = ExplicitCredentials::new(Some("  "), Some(""));
        let resolved = resolve(
            &policy(GatewayMode::Local),
            &env(None, None),
            Some(&explicit),
            None,
        );
        assert_eq!(resolved.token, some("config-token"));
        assert_eq!(resolved.password, some("config-password"));
    }

    #[test]
    fn test_url_override_yields_nothing() {
        let resolved = resolve(
            &policy(GatewayMode::Local),
            &env(Some("env-token"), Some("env-password")),
            None,
            Some("ws://other-host:18789/ws"),
        );
        assert!(resolved.is_empty());

        let remote = with_remote(policy(GatewayMode::Remote), "remote-token", "remote-password");
        let resolved = resolve(&remote, &env(None, None), None, Some("wss://x/ws"));
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_blank_url_override_is_ignored() {
        let resolved = resolve(&policy(GatewayMode::Local), &env(None, None), None, Some(" "));
        assert_eq!(resolved.token, some("config-token"));
    }

    #[test]
    fn test_local_env_beats_config_per_field() {
        let resolved = resolve(
            &policy(GatewayMode::Local),
            &env(Some("env-token"), None),
            None,
            None,
        );
        assert_eq!(resolved.token, some("env-token"));
        assert_eq!(resolved.password, some("config-password"));

        let resolved = resolve(
            &policy(GatewayMode::Local),
            &env(None, Some("env-password")),
            None,
            None,
        );
        assert_eq!(resolved.token, some("config-token"));
        assert_eq!(resolved.password, some("env-password"));
    }

    #[test]
    fn test_local_ignores_remote_section() {
        let local = with_remote(policy(GatewayMode::Local), "remote-token", "remote-password");
        let resolved = resolve(&local, &env(None, None), None, None);
        assert_eq!(resolved.token, some("config-token"));
        assert_eq!(resolved.password, some("config-password"));
    }

    #[test]
    fn test_remote_default_precedence() {
        let remote = with_remote(policy(GatewayMode::Remote), "remote-token", "remote-password");
        let resolved = resolve(
            &remote,
            &env(Some("env-token"), Some("env-password")),
            None,
            None,
        );
        assert_eq!(resolved.token, some("remote-token"));
        assert_eq!(resolved.password, some("remote-password"));
    }

    #[test]
    fn test_remote_empty_falls_through_to_env() {
        let resolved = resolve(
            &policy(GatewayMode::Remote),
            &env(Some("env-token"), Some("env-password")),
            None,
            None,
        );
        assert_eq!(resolved.token, some("env-token"));
        assert_eq!(resolved.password, some("env-password"));
    }

    #[test]
    fn test_remote_falls_through_to_local_config() {
        let resolved = resolve(&policy(GatewayMode::Remote), &env(None, None), None, None);
        assert_eq!(resolved.token, some("config-token"));
        assert_eq!(resolved.password, some("config-password"));
    }

    #[test]
    fn test_remote_env_first_only_affects_password() {
        let remote = with_remote(policy(GatewayMode::Remote), "remote-token", "remote-password");
        let vars = env(Some("env-token"), Some("env-password"));
        let resolved = resolve_gateway_credentials(
            &remote,
            &vars,
            None,
            None,
            RemotePasswordPrecedence::EnvFirst,
        );
        assert_eq!(resolved.token, some("remote-token"));
        assert_eq!(resolved.password, some("env-password"));

        let resolved = resolve_gateway_credentials(
            &remote,
            &env(None, None),
            None,
            None,
            RemotePasswordPrecedence::EnvFirst,
        );
        assert_eq!(resolved.password, some("remote-password"));
    }

    #[test]
    fn test_whitespace_is_absent_at_every_layer() {
        let mut remote = with_remote(policy(GatewayMode::Remote), "   ", "\t");
        remote.auth.token = some(" ");
        let resolved = resolve(&remote, &env(Some(" "), Some(" env-password ")), None, None);
        assert_eq!(resolved.token, None);
        assert_eq!(resolved.password, some("env-password"));
    }

    #[test]
    fn test_legacy_env_alias() {
        let mut vars = HashMap::new();
        vars.insert(LEGACY_TOKEN_VAR.to_string(), "legacy-token".to_string());
        let resolved = resolve(&policy(GatewayMode::Local), &vars, None, None);
        assert_eq!(resolved.token, some("legacy-token"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let resolved = ResolvedCredentials {
            token: some("super-secret"),
            password: None,
        };
        let printed = format!("{resolved:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
