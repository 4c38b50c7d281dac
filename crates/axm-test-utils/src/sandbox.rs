//! Fake sandbox provider

use async_trait::async_trait;
use axm_core::{SandboxProvider, SandboxSpec};
use axm_types::SandboxError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Records provisioned and destroyed sandboxes
#[derive(Debug, Default)]
pub struct FakeSandboxProvider {
    counter: AtomicU64,
    fail_provision: AtomicBool,
    hang_provision: AtomicBool,
    provisioned: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
}

impl FakeSandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose provisioning always fails
    pub fn failing() -> Self {
        let provider = Self::default();
        provider.fail_provision.store(true, Ordering::SeqCst);
        provider
    }

    /// Provider whose provisioning never completes
    pub fn hanging() -> Self {
        let provider = Self::default();
        provider.hang_provision.store(true, Ordering::SeqCst);
        provider
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.lock().clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().clone()
    }
}

#[async_trait]
impl SandboxProvider for FakeSandboxProvider {
    async fn provision(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(SandboxError::new(None, "provision", format!("no capacity for {}", spec.scope_path)));
        }
        if self.hang_provision.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let id = format!("sbx-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.provisioned.lock().push(id.clone());
        Ok(id)
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        self.destroyed.lock().push(sandbox_id.to_string());
        Ok(())
    }
}
