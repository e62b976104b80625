use std::fmt;

use crate::error::OrchestrationError;

/// Opaque, time-limited token for the remote agent service. Redacted in
/// Debug output so it never leaks through logs or error chains.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Result<Self, OrchestrationError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(OrchestrationError::Authentication(
                "credential token is empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Resolves the remote-service credential from the environment variable the
/// configuration names. Absence is an authentication failure for the remote
/// capability only; local members are unaffected.
pub fn resolve_remote_credential(env_key: &str) -> Result<Credential, OrchestrationError> {
    let token = std::env::var(env_key).map_err(|_| {
        OrchestrationError::Authentication(format!(
            "remote agent credential env '{env_key}' is not set"
        ))
    })?;

    if token.trim().is_empty() {
        return Err(OrchestrationError::Authentication(format!(
            "remote agent credential env '{env_key}' is set but empty"
        )));
    }

    Credential::new(token)
}
