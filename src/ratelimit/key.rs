//! Limiting-key computation.
//!
//! A limit is tracked against an opaque key derived from request attributes.
//! Which attributes go into the key decides the limiting scope: per client
//! address, per authenticated user, per endpoint, per role, or any
//! combination of those.

use std::sync::Arc;

/// The identity attributes of one logical request, as handed over by the
/// hosting web layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub remote_addr: Option<String>,
    pub user_id: Option<String>,
    pub endpoint: Option<String>,
    pub role: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Pluggable key functions.
#[derive(Clone)]
pub enum KeyStrategy {
    /// Client address. Falls back to `"unknown"` when no address is known.
    Ip,
    /// Authenticated user id, falling back to the client address and finally
    /// `"anonymous"`.
    User,
    /// Endpoint name, `"unknown"` when absent.
    Endpoint,
    /// User role, `"guest"` when absent.
    Role,
    /// Sub-keys joined with `_`, e.g. address and user id together.
    Combined(Vec<KeyStrategy>),
    /// Arbitrary caller-supplied key function.
    Custom(Arc<dyn Fn(&RequestContext) -> String + Send + Sync>),
}

impl KeyStrategy {
    pub fn key(&self, ctx: &RequestContext) -> String {
        match self {
            Self::Ip => ctx.remote_addr.clone().unwrap_or_else(|| "unknown".to_string()),
            Self::User => ctx
                .user_id
                .clone()
                .or_else(|| ctx.remote_addr.clone())
                .unwrap_or_else(|| "anonymous".to_string()),
            Self::Endpoint => ctx.endpoint.clone().unwrap_or_else(|| "unknown".to_string()),
            Self::Role => ctx.role.clone().unwrap_or_else(|| "guest".to_string()),
            Self::Combined(parts) => parts
                .iter()
                .map(|part| part.key(ctx))
                .collect::<Vec<_>>()
                .join("_"),
            Self::Custom(f) => f(ctx),
        }
    }

    /// Combine this strategy with another, joining the sub-keys with `_`.
    pub fn and(self, other: KeyStrategy) -> KeyStrategy {
        match self {
            Self::Combined(mut parts) => {
                parts.push(other);
                Self::Combined(parts)
            }
            first => Self::Combined(vec![first, other]),
        }
    }
}

impl std::fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => f.write_str("Ip"),
            Self::User => f.write_str("User"),
            Self::Endpoint => f.write_str("Endpoint"),
            Self::Role => f.write_str("Role"),
            Self::Combined(parts) => f.debug_tuple("Combined").field(parts).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
