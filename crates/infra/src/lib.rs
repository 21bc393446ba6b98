//! Infrastructure layer: config, stores (in-memory + Postgres), the weight
//! indicator, reference seeding and the application workflows.

pub mod config;
pub mod indicator;
pub mod seed;
pub mod store;
pub mod workflow;

pub use config::Settings;
pub use workflow::{Services, WorkflowError, WorkflowResult};
