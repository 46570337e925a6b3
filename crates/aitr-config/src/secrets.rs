//! Runtime secret resolution.
//!
//! Config stores only env var NAMES; callers resolve once at startup and
//! pass the result into constructors rather than scattering `std::env::var`
//! calls through the codebase. `Debug` redacts every value.

/// Secrets resolved from the environment for one daemon instantiation. Paper
/// trading needs no broker credentials; this only carries what the store and
/// the optional notification webhook need.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub database_url: Option<String>,
    pub notify_webhook_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .field(
                "notify_webhook_url",
                &self.notify_webhook_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolves secrets from well-known env var names. Both are optional: the
/// store falls back to an in-memory backend and notifications are simply
/// skipped when absent.
pub fn resolve_secrets() -> ResolvedSecrets {
    ResolvedSecrets {
        database_url: resolve_env("AITR_DATABASE_URL"),
        notify_webhook_url: resolve_env("AITR_NOTIFY_WEBHOOK_URL"),
    }
}
