use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use wardgate_core::DeviceTokenConfig;
use wardgate_security::safe_equal;

/// Lookup of per-device tokens issued at pairing time.
#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    /// True if `token` is the current token for `device_id`.
    async fn verify(&self, device_id: &str, token: &str) -> bool;
}

/// Device tokens held in memory.
#[derive(Default)]
pub struct InMemoryDeviceTokens {
    tokens: RwLock<HashMap<String, String>>,
}

impl InMemoryDeviceTokens {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from `[[gateway.devices]]`.
    pub fn from_config(devices: &[DeviceTokenConfig]) -> Self {
        let store = Self::new();
        for device in devices {
            store.register(&device.id, &device.token);
        }
        store
    }

    /// Pair a device, replacing any previous token.
    pub fn register(&self, device_id: &str, token: &str) {
        self.tokens
            .write()
            .insert(device_id.trim().to_string(), token.trim().to_string());
    }

    /// Unpair a device. Returns false if it was not known.
    pub fn revoke(&self, device_id: &str) -> bool {
        self.tokens.write().remove(device_id.trim()).is_some()
    }

    /// Number of paired devices.
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// True when no device is paired.
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl DeviceTokenStore for InMemoryDeviceTokens {
    async fn verify(&self, device_id: &str, token: &str) -> bool {
        let tokens = self.tokens.read();
        tokens
            .get(device_id)
            .is_some_and(|expected| safe_equal(token, expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_verify_revoke() {
        let store = InMemoryDeviceTokens::new();
        store.register("laptop", " dev-token ");
        assert!(store.verify("laptop", "dev-token").await);
        assert!(!store.verify("laptop", "other").await);
        assert!(!store.verify("phone", "dev-token").await);

        assert!(store.revoke("laptop"));
        assert!(!store.revoke("laptop"));
        assert!(!store.verify("laptop", "dev-token").await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_from_config() {
        let store = InMemoryDeviceTokens::from_config(&[
            DeviceTokenConfig {
                id: "a".to_string(),
                token: "ta".to_string(),
            },
            DeviceTokenConfig {
                id: "b".to_string(),
                token: "tb".to_string(),
            },
        ]);
        assert_eq!(store.len(), 2);
        assert!(store.verify("b", "tb").await);
    }
}
