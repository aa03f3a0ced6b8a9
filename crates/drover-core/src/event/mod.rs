//! Workflow lifecycle events.
//!
//! An explicit observer-list registry: listeners are invoked synchronously
//! in registration order, and a panicking listener is isolated (caught and
//! logged) so it can never abort the scheduler.

pub mod registry;

pub use registry::{Subscription, WorkflowEvents};
