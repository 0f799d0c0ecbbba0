//! refgate core library
//!
//! Lets an untrusted caller run a media tool through opaque `{{id}}`
//! references. Real paths exist only inside the [`registry`]; templates are
//! checked by the [`validator`], resolved by [`substitution`], split by the
//! [`tokenizer`] and handed to an [`executor`]. Output goes back through
//! reverse substitution before any caller sees it.

pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod hasher;
pub mod registry;
pub mod substitution;
pub mod tokenizer;
pub mod tools;
pub mod validator;

pub use config::GatewayConfig;
pub use error::{GatewayError, Rejection, Result};
pub use executor::{ExecutionOutput, ProcessExecutor, SystemExecutor};
pub use gateway::Gateway;
pub use hasher::{ContentHasher, Sha256Hasher};
pub use registry::{Reference, ReferenceKind, ReferenceRegistry};
pub use substitution::PlaceholderSubstitutor;
pub use tools::{call_tool, tool_definitions, ToolResult};
