pub mod auth;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod registry;
pub mod store;
pub mod validation;

pub use auth::*;
pub use command::*;
pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use gateway::*;
pub use lifecycle::*;
pub use registry::{all_commands, publish, Choice, CommandSpec, OptionKind, OptionSpec};
pub use store::*;
