//! Shared fixtures for unit tests

use std::sync::{Arc, OnceLock};

use crate::protocol::crypto::ServerKey;

/// One 1024-bit key per test binary; generation is the slow part
pub(crate) fn test_key() -> Arc<ServerKey> {
    static KEY: OnceLock<Arc<ServerKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(ServerKey::generate().expect("key generation")))
        .clone()
}
