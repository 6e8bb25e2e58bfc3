//! Order fulfillment orchestration.
//!
//! [`orchestrator`] drives the per-order sequence — reserve stock, create
//! the Magento order, invoice, ship, propagate shipping status — with every
//! step independently idempotent and skippable. [`outbox`] holds the
//! durable [`FulfillmentChange`] work-item contract with coalescing
//! enqueue semantics.

pub mod orchestrator;
pub mod outbox;

pub use orchestrator::{
    FulfillmentConfig, FulfillmentOrchestrator, LogLevel, MagentoGateway, OrderLog, OrderStore,
    ProcessReport, Step, StepResult, StepSkip,
};
pub use outbox::{
    coalesce_params, ChangeParams, EnqueueResult, FulfillmentAction, FulfillmentChange,
    FulfillmentOutbox, Initiator, ItemShipment, NewFulfillmentChange,
};
