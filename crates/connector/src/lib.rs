//! Order lifecycle and reconciliation for one exchange account.
//!
//! [`Connector`] tracks every order from submission to a terminal state,
//! mirrors account balances, and keeps both in line with the exchange through
//! two channels: the pushed user stream and periodic REST polling. Either may
//! deliver a given update first, late, or twice; the tracker makes the result
//! the same regardless.
//!
//! The exchange itself sits behind [`connector_core::Transport`]. The
//! [`PaperTransport`] here simulates one in process.

mod clock;
mod connector;
mod orders;
mod paper;
mod polling;
mod status;
mod trading_rules;
mod user_stream;

pub use connector::Connector;
pub use orders::{CancelFailure, CancellationResult};
pub use paper::PaperTransport;
pub use polling::PollReport;
pub use status::ConnectorStatus;
