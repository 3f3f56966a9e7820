//! Point of sale: register shifts, cart pricing, checkout planning and sales.
//!
//! Deterministic domain logic only; the checkout workflow that ties these to
//! stock, receivables and the journal lives in `tokoledger-infra`.

pub mod cart;
pub mod checkout;
pub mod register;
pub mod sale;

pub use cart::{Cart, CartLine, CartTotals, OrderDiscount};
pub use checkout::{
    CheckoutPlan, CheckoutRequest, ReceivableDraft, SaleDocument, ShiftTakings, StockDraw, Tender,
    TenderMethod, plan,
};
pub use register::{
    CashDirection, CashMoved, CloseShift, ClosedShift, OpenShift, RecordCashMovement,
    RecordShiftRefund, RecordShiftSale, Register, RegisterCommand, RegisterEvent, ShiftClosed,
    ShiftOpened, ShiftRefundRecorded, ShiftSaleRecorded, ShiftState,
};
pub use sale::{RecordSale, Sale, SaleCommand, SaleEvent, SaleId, SaleRecorded, SaleStatus, SaleVoided, VoidSale};
