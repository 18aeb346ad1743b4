//! Per-resource in-flight tracking so a second click does not send a second request.
use crate::error::ValidationError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Marks a resource busy until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    resource: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `resource`, failing if a request for it is still outstanding.
    pub fn begin(&self, resource: impl Into<String>) -> Result<InFlightGuard, ValidationError> {
        let resource = resource.into();
        if !self.active.lock().insert(resource.clone()) {
            tracing::debug!(%resource, "dropping duplicate request");
            return Err(ValidationError::RequestInFlight(resource));
        }

        Ok(InFlightGuard {
            resource,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, resource: &str) -> bool {
        self.active.lock().contains(resource)
    }
}

impl InFlightGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.resource);
    }
}
