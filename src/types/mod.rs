//! Domain types delivered by the streaming session.
//!
//! ## Organization
//!
//! - [`enums`]: Settlement terms, boards, and option kinds
//! - [`quotes`]: Securities, options, repos, and personal portfolio records
//! - [`order_book`]: Level 2 order book snapshots
//!
//! All types are re-exported at the module root.

pub mod enums;
pub mod order_book;
pub mod quotes;

pub use enums::*;
pub use order_book::*;
pub use quotes::*;
