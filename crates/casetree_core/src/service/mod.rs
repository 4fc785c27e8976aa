//! Case and item handle API.
//!
//! # Responsibility
//! - Orchestrate repository and storage calls into item-level operations.
//! - Keep callers decoupled from SQL and filesystem details.
//! - Publish change notifications through an injected `EventPublisher`.

mod case;
pub mod error;
mod item;
pub mod publisher;

pub use case::{Case, CaseTransaction};
pub use error::{CaseError, CaseResult};
pub use item::Item;
pub use publisher::{CaseEvent, EventPublisher, NoopPublisher};
