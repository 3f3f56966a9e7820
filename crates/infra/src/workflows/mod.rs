//! Workflows that span several aggregates.
//!
//! Each step is an ordinary dispatch; there is no cross-stream transaction.
//! A step that fails after earlier writes either compensates (checkout,
//! purchase stock) or leaves the journal to the backfill, and says so in the
//! outcome's warnings.
//!
//! Every committed batch is folded into [`Projections`] before the workflow
//! moves on, so later steps and the caller read their own writes.

pub mod catalog;
pub mod checkout;
pub mod drawer;
pub mod ledger;
pub mod purchase;
pub mod settlement;
pub mod void;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use tokoledger_accounting::{
    InitializeChart, Ledger, LedgerCommand, LedgerId, PostingSource, default_chart,
    ledger::AGGREGATE_TYPE as LEDGER,
};
use tokoledger_core::{Aggregate, AggregateId, DomainError, OutletId, TenantId};
use tokoledger_events::{Event, EventBus, EventEnvelope};
use tokoledger_inventory::{
    OpenStock, Product, ProductId, Purchase, PurchaseId, StockCommand, StockItem, StockItemId,
    stock::AGGREGATE_TYPE as STOCK,
};
use tokoledger_pos::{Register, Sale, SaleId};
use tokoledger_receivables::{Debt, DebtId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::Projections;

pub use catalog::{NewProduct, StockAdjustment};
pub use checkout::{CheckoutInput, CheckoutItem, CheckoutOutcome, receipt_number};
pub use ledger::{BackfillFailure, BackfillReport, ExpenseInput, ManualEntry};
pub use purchase::{PurchaseInput, PurchaseLine, PurchaseOutcome};
pub use settlement::{CloseShiftOutcome, PaymentOutcome};
pub use void::VoidOutcome;

/// Attempts per dispatch when another writer got to the stream first.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortage {
    pub product_id: ProductId,
    pub product_name: String,
    pub on_hand: i64,
    pub requested: i64,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Nothing was written.
    #[error("insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<StockShortage>),

    #[error("{0} not found")]
    NotFound(String),
}

/// What happened to a journal posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "entry_id", rename_all = "snake_case")]
pub enum PostingOutcome {
    Posted(Uuid),
    /// The reference was already in the journal.
    AlreadyPosted,
    /// Every line netted to zero.
    Empty,
}

impl PostingOutcome {
    pub fn entry_id(self) -> Option<Uuid> {
        match self {
            PostingOutcome::Posted(id) => Some(id),
            _ => None,
        }
    }
}

pub(crate) fn ledger_of(_: TenantId, id: AggregateId) -> Ledger {
    Ledger::empty(LedgerId::new(id))
}

pub(crate) fn product_of(_: TenantId, id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

pub(crate) fn stock_of(_: TenantId, id: AggregateId) -> StockItem {
    StockItem::empty(StockItemId(id))
}

pub(crate) fn purchase_of(_: TenantId, id: AggregateId) -> Purchase {
    Purchase::empty(PurchaseId::new(id))
}

pub(crate) fn register_of(_: TenantId, id: AggregateId) -> Register {
    Register::empty(OutletId::from_uuid(*id.as_uuid()))
}

pub(crate) fn sale_of(_: TenantId, id: AggregateId) -> Sale {
    Sale::empty(SaleId::new(id))
}

pub(crate) fn debt_of(_: TenantId, id: AggregateId) -> Debt {
    Debt::empty(DebtId::new(id))
}

/// Entry point for every write the application performs.
#[derive(Debug)]
pub struct Workflows<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    projections: Arc<Projections>,
}

impl<S, B> Clone for Workflows<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            projections: Arc::clone(&self.projections),
        }
    }
}

impl<S, B> Workflows<S, B> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, projections: Arc<Projections>) -> Self {
        Self {
            dispatcher,
            projections,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch one command and fold what it committed into the read models.
    ///
    /// Concurrency failures are retried against a freshly loaded stream.
    pub fn execute<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, WorkflowError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 1;
        let committed = loop {
            match self.dispatcher.dispatch(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command.clone(),
                &make_aggregate,
            ) {
                Err(DispatchError::Concurrency(msg)) if attempt < MAX_ATTEMPTS => {
                    debug!(aggregate_type, attempt, "retrying after concurrent write: {msg}");
                    attempt += 1;
                }
                other => break other?,
            }
        };

        if let Err(e) = self.projections.apply_committed(self.dispatcher.store(), &committed) {
            warn!(aggregate_type, %aggregate_id, "read models lag behind the store: {e}");
        }
        Ok(committed)
    }

    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, WorkflowError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        Ok(self.dispatcher.load(tenant_id, aggregate_id, make_aggregate)?)
    }

    pub fn ledger(&self, tenant_id: TenantId) -> Result<Ledger, WorkflowError> {
        self.load(tenant_id, LedgerId::for_tenant(tenant_id).aggregate_id(), ledger_of)
    }

    /// A product that exists; archived products are returned as well.
    pub fn product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Product, WorkflowError> {
        let product = self.load(tenant_id, product_id.0, product_of)?;
        if !product.is_created() {
            return Err(WorkflowError::NotFound(format!("product {product_id}")));
        }
        Ok(product)
    }

    /// May be unopened; check [`StockItem::is_created`].
    pub fn stock_item(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
    ) -> Result<StockItem, WorkflowError> {
        let id = StockItemId::for_outlet(product_id, outlet_id);
        self.load(tenant_id, id.aggregate_id(), stock_of)
    }

    pub fn register(&self, tenant_id: TenantId, outlet_id: OutletId) -> Result<Register, WorkflowError> {
        self.load(tenant_id, outlet_id.into(), register_of)
    }

    pub fn sale(&self, tenant_id: TenantId, sale_id: SaleId) -> Result<Sale, WorkflowError> {
        let sale = self.load(tenant_id, sale_id.0, sale_of)?;
        if sale.document().is_none() {
            return Err(WorkflowError::NotFound(format!("sale {sale_id}")));
        }
        Ok(sale)
    }

    pub fn debt(&self, tenant_id: TenantId, debt_id: DebtId) -> Result<Debt, WorkflowError> {
        let debt = self.load(tenant_id, debt_id.0, debt_of)?;
        if !debt.is_created() {
            return Err(WorkflowError::NotFound(format!("debt {debt_id}")));
        }
        Ok(debt)
    }

    /// Open the product's stock at `outlet_id` when this is its first movement
    /// there, seeding the average cost from the catalog cost.
    pub fn ensure_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
        occurred_at: DateTime<Utc>,
    ) -> Result<StockItemId, WorkflowError> {
        let id = StockItemId::for_outlet(product_id, outlet_id);
        if self.load(tenant_id, id.aggregate_id(), stock_of)?.is_created() {
            return Ok(id);
        }
        let product = self.product(tenant_id, product_id)?;
        let opened = self.execute(
            tenant_id,
            id.aggregate_id(),
            STOCK,
            StockCommand::OpenStock(OpenStock {
                product_id,
                outlet_id,
                initial_cost: product.cost_price(),
                occurred_at,
            }),
            stock_of,
        );
        match opened {
            // Opened by a concurrent writer in the meantime.
            Ok(_) | Err(WorkflowError::Dispatch(DispatchError::Conflict(_))) => Ok(id),
            Err(e) => Err(e),
        }
    }

    /// Open whichever default accounts the ledger is missing.
    pub fn ensure_chart(&self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> Result<(), WorkflowError> {
        let ledger = self.ledger(tenant_id)?;
        let chart = default_chart();
        if chart.iter().all(|a| ledger.account(&a.code).is_some()) {
            return Ok(());
        }
        let seeded = self.execute(
            tenant_id,
            LedgerId::for_tenant(tenant_id).aggregate_id(),
            LEDGER,
            LedgerCommand::InitializeChart(InitializeChart {
                accounts: chart,
                occurred_at,
            }),
            ledger_of,
        );
        match seeded {
            // Completed by a concurrent writer.
            Ok(_) | Err(WorkflowError::Dispatch(DispatchError::Conflict(_))) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Post `source` to the tenant's journal. Idempotent per reference.
    pub fn post(&self, tenant_id: TenantId, source: &PostingSource) -> Result<PostingOutcome, WorkflowError> {
        let Some(draft) = source.draft() else {
            return Ok(PostingOutcome::Empty);
        };
        self.ensure_chart(tenant_id, draft.occurred_at)?;

        let entry_id = Uuid::now_v7();
        let committed = self.execute(
            tenant_id,
            LedgerId::for_tenant(tenant_id).aggregate_id(),
            LEDGER,
            LedgerCommand::PostJournalEntry(draft.into_command(entry_id)),
            ledger_of,
        )?;
        Ok(if committed.is_empty() {
            PostingOutcome::AlreadyPosted
        } else {
            PostingOutcome::Posted(entry_id)
        })
    }

    /// Fail early when `source` could not be posted against the current chart.
    pub fn check_posting(&self, tenant_id: TenantId, source: &PostingSource) -> Result<(), WorkflowError> {
        let Some(draft) = source.draft() else {
            return Ok(());
        };
        self.ensure_chart(tenant_id, draft.occurred_at)?;
        self.ledger(tenant_id)?.check_lines(&draft.lines)?;
        Ok(())
    }

    /// Post after the business writes already happened: a failure is only
    /// reported, the backfill picks the document up later.
    pub(crate) fn post_or_warn(
        &self,
        tenant_id: TenantId,
        source: &PostingSource,
        warnings: &mut Vec<String>,
    ) -> Option<PostingOutcome> {
        match self.post(tenant_id, source) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                let reference = source.reference();
                warn!(%tenant_id, %reference, "journal posting failed: {e}");
                warnings.push(format!("journal entry for {reference} not posted: {e}"));
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::Value as JsonValue;

    use tokoledger_core::{Money, OutletId, TenantId, UserId};
    use tokoledger_events::{EventEnvelope, InMemoryEventBus};
    use tokoledger_inventory::{CreateProduct, ProductCommand, ProductId, ProductUnit, product::AGGREGATE_TYPE as PRODUCT};
    use tokoledger_pos::{OpenShift, RegisterCommand, register::AGGREGATE_TYPE as REGISTER};
    use uuid::Uuid;

    use super::*;
    use crate::event_store::InMemoryEventStore;

    pub type TestWorkflows =
        Workflows<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    pub fn workflows() -> TestWorkflows {
        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()));
        Workflows::new(Arc::new(dispatcher), Arc::new(Projections::new()))
    }

    pub fn create_product(wf: &TestWorkflows, tenant: TenantId, name: &str, price: i64, cost: i64) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        wf.execute(
            tenant,
            id.0,
            PRODUCT,
            ProductCommand::CreateProduct(CreateProduct {
                sku: name.to_uppercase(),
                name: name.into(),
                units: vec![
                    ProductUnit::new("pcs", 1, Money::new(price)),
                    ProductUnit::new("box", 10, Money::new(price * 9)),
                ],
                cost_price: Money::new(cost),
                occurred_at: Utc::now(),
            }),
            product_of,
        )
        .unwrap();
        id
    }

    pub fn open_shift(wf: &TestWorkflows, tenant: TenantId, outlet: OutletId, opening: i64) -> Uuid {
        let shift_id = Uuid::now_v7();
        wf.execute(
            tenant,
            outlet.into(),
            REGISTER,
            RegisterCommand::OpenShift(OpenShift {
                shift_id,
                cashier: UserId::new(),
                opening_cash: Money::new(opening),
                occurred_at: Utc::now(),
            }),
            register_of,
        )
        .unwrap();
        shift_id
    }
}
