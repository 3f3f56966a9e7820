//! `tokoledger-print-agent`: a small local HTTP service that turns receipt
//! JSON into ESC/POS bytes for a thermal printer and label bitmaps into
//! NiiMBot packets for a BLE bridge.

pub mod app;
pub mod config;
pub mod printer;
