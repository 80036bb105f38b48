//! Broker event dispatch engine for arcindex.
//!
//! Consumes filesystem-change events from a fanout broker topology with
//! worker threads competing on one shared queue per consumer role,
//! dispatches decoded messages through a
//! startup-time handler registry, and keeps acknowledgment on the thread
//! that owns each connection.

pub mod ack;
pub mod broker;
pub mod consumer;
pub mod handlers;

pub use ack::{AckHandle, AckScheduler};
pub use broker::{
    BrokerConnection, BrokerEndpoint, CorrectivePublisher, Delivery, InMemoryBroker, TopologySpec,
};
pub use consumer::{ConsumerPool, ConsumerState, ConsumerWorker};
pub use handlers::{
    DirectoryUpdateHandler, FileUpdateHandler, HandlerRegistry, VisibilityWait,
};
