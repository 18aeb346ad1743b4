//! Explicit session context, created on login and dropped on logout or 401
use crate::error::{self, RemoteError, ValidationError};
use crate::types::Role;
use serde::{Deserialize, Serialize};

/// Bearer token plus who it belongs to.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[n(0)]
    pub token: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub role: Role,
}

impl Session {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            role,
        }
    }

    pub fn require_role(&self, role: Role) -> Result<(), RemoteError> {
        if self.role == role {
            Ok(())
        } else {
            Err(RemoteError::Forbidden(format!("{role} access required")))
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionContext {
    current: Option<Session>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, session: Session) {
        tracing::debug!(user_id = %session.user_id, role = %session.role, "session started");
        self.current = Some(session);
    }

    /// Drop the session, returning it if there was one.
    pub fn end(&mut self) -> Option<Session> {
        let ended = self.current.take();
        if let Some(session) = &ended {
            tracing::debug!(user_id = %session.user_id, "session ended");
        }
        ended
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Fails before any call is attempted when nobody is logged in.
    pub fn require(&self) -> Result<&Session, ValidationError> {
        self.current.as_ref().ok_or(ValidationError::NotLoggedIn)
    }

    /// Pass a result through, ending the session if it carries a 401.
    pub fn observe<T>(&mut self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        if let Err(err) = &result {
            if error::is_unauthorized(err) {
                tracing::warn!("session rejected by store, clearing it");
                self.end();
            }
        }
        result
    }

    /// Run an authenticated operation with the current session.
    pub fn run<T>(
        &mut self,
        op: impl FnOnce(&Session) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let session = self.require()?.clone();
        let result = op(&session);
        self.observe(result)
    }
}
