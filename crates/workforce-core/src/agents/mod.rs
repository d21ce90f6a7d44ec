//! Specialist agents
//!
//! Each specialist is a persona plus a tool subset bound to the generic
//! [`AgentRuntime`](crate::runtime::AgentRuntime), with convenience operations
//! that template a request and call `execute`.

pub mod leasing;
pub mod marketing;
pub mod profile;
pub mod property;
pub mod roster;

pub use leasing::LeasingAgent;
pub use marketing::MarketingAgent;
pub use profile::AgentProfile;
pub use property::PropertyAgent;
pub use roster::{Workforce, WorkforceBuilder};
