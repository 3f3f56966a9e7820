//! Infrastructure layer: event storage, command dispatch, read models and the
//! multi-aggregate workflows (checkout, void, purchase, settlement, backfill).

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workflows;
