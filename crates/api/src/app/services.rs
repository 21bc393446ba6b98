use std::sync::Arc;

use weighbridge_core::{Clock, SystemClock};
use weighbridge_infra::seed::seed_defaults;
use weighbridge_infra::{Services, Settings, WorkflowResult};

/// Which store backend the process is running against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Postgres,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::InMemory => "in-memory",
            Backend::Postgres => "postgres",
        }
    }
}

/// Shared handles for the handlers, injected as an `Extension`.
#[derive(Debug, Clone)]
pub struct AppServices {
    backend: Backend,
    services: Services,
}

impl AppServices {
    pub async fn from_settings(settings: Settings) -> WorkflowResult<Self> {
        let backend = if settings.database_url.is_some() {
            Backend::Postgres
        } else {
            Backend::InMemory
        };
        let services = Services::from_settings(settings).await?;
        Ok(Self { backend, services })
    }

    /// Seeded in-memory stores; used by tests and local runs without a database.
    pub async fn in_memory(settings: Settings, clock: Arc<dyn Clock>) -> WorkflowResult<Self> {
        let services = Services::in_memory(settings, clock);
        seed_defaults(services.reference.as_ref(), services.clock.now()).await?;
        Ok(Self { backend: Backend::InMemory, services })
    }

    pub async fn in_memory_default() -> WorkflowResult<Self> {
        Self::in_memory(Settings::default(), Arc::new(SystemClock)).await
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

impl core::ops::Deref for AppServices {
    type Target = Services;

    fn deref(&self) -> &Self::Target {
        &self.services
    }
}
