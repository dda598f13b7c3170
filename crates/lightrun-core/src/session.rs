use async_trait::async_trait;
use std::sync::RwLock;

/// Signed-in visitor as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
    pub id: String,
    /// Bearer token for the vote store, when the backend needs one
    pub access_token: Option<String>,
}

impl Visitor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_visitor(&self) -> Option<Visitor>;
}

/// Session whose visitor is set explicitly (CLI flags, tests).
#[derive(Debug, Default)]
pub struct StaticSession {
    visitor: RwLock<Option<Visitor>>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(visitor: Visitor) -> Self {
        Self {
            visitor: RwLock::new(Some(visitor)),
        }
    }

    pub fn sign_in(&self, visitor: Visitor) {
        *self.visitor.write().unwrap_or_else(|e| e.into_inner()) = Some(visitor);
    }

    pub fn sign_out(&self) {
        *self.visitor.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_visitor(&self) -> Option<Visitor> {
        self.visitor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
