//! Environment lookup for gateway secrets.
//!
//! Each secret has a primary variable and one legacy alias. The alias is
//! consulted only when the primary is unset or blank.

use std::collections::HashMap;
use wardgate_core::normalize;

/// Primary token variable.
pub const TOKEN_VAR: &str = "WARDGATE_GATEWAY_TOKEN";
/// Legacy token variable.
pub const LEGACY_TOKEN_VAR: &str = "WARDGATE_TOKEN";
/// Primary password variable.
pub const PASSWORD_VAR: &str = "WARDGATE_GATEWAY_PASSWORD";
/// Legacy password variable.
pub const LEGACY_PASSWORD_VAR: &str = "WARDGATE_PASSWORD";

/// A source of environment variables.
pub trait EnvSource {
    /// Raw value of `name`, if set.
    fn var(&self, name: &str) -> Option<String>;
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// The live process environment, read on every lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

fn lookup<E: EnvSource + ?Sized>(env: &E, primary: &str, legacy: &str) -> Option<String> {
    normalize(env.var(primary).as_deref()).or_else(|| normalize(env.var(legacy).as_deref()))
}

/// Token from the environment.
pub fn env_token<E: EnvSource + ?Sized>(env: &E) -> Option<String> {
    lookup(env, TOKEN_VAR, LEGACY_TOKEN_VAR)
}

/// Password from the environment.
pub fn env_password<E: EnvSource + ?Sized>(env: &E) -> Option<String> {
    lookup(env, PASSWORD_VAR, LEGACY_PASSWORD_VAR)
}
