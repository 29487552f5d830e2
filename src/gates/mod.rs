//! Pure gating decisions, evaluated fresh each turn.

pub mod books;
pub mod invite;
pub mod signals;

pub use books::{books_gate, BooksGateReason};
pub use invite::{invite_gate, CadenceReason, InviteGateInput};
pub use signals::{ConsentSignal, KeywordSignalExtractor, SignalExtractor};
