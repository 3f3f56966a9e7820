//! `tokoledger-printing`: printer byte protocols.
//!
//! ESC/POS for thermal receipt printers and the framed packet protocol spoken
//! by NiiMBot label printers. Pure byte building: no IO.

pub mod escpos;
pub mod niimbot;
pub mod receipt;

pub use escpos::{Alignment, EscPosBuilder, PaperWidth};
pub use niimbot::{label_job, LabelBitmap, LabelError, Packet, PacketError, PacketReader};
pub use receipt::{render, wrap, MoneyFormat, PrintError, Receipt, ReceiptItem, ReceiptPayment, MAX_COPIES};
