//! Agency library root.

pub mod adapters;
pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod task;
pub mod web;

pub use agent::Agent;
pub use cli::Commands;
pub use config::{load_config, AgencyConfig};
pub use crate::core::{Agency, Intake, Job, Router};
pub use error::{Error, Result};
pub use protocol::{ACLMessage, AgencyInfo, AgentId, AgentInfo, Performative, Status, StatusCode};
pub use task::{AgentTask, EchoTask};
pub use web::run_server;
