pub mod client;
pub mod config;
pub mod domains;
pub mod e2e;
pub mod error;
pub mod factories;
pub mod interfaces;
pub mod services;
pub mod session;

pub use crate::client::ChorusClient;
pub use crate::config::Config;
pub use crate::domains::correlation::{Classification, CorrelationOutcome, CorrelationState};
pub use crate::domains::message::{Message, MessageContent, Request, ResponseBody};
pub use crate::domains::resource::{ResolveMode, ResolveOutcome};
pub use crate::error::{ChorusError, Result};
pub use crate::services::correlator::{CancelFlag, CorrelationHandle, RequestCorrelator};
pub use crate::services::resolver::ResourceResolver;
pub use crate::session::Session;
