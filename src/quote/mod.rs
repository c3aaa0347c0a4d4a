//! Quote module - decoding, classification, pricing, selection and sizing
//!
//! ```text
//!  venue ──► codec ──► duration ─┐
//!              │                 ├──► selector ──► sizer ──► execution
//!              └──────► payout ──┘
//! ```

pub mod codec;
pub mod duration;
pub mod payout;
pub mod selector;
pub mod sizer;
pub mod venue;

pub use codec::{
    decode_wire, encode, format_strikes, parse, parse_all, ParsedQuote, RawQuote, RawQuoteWire,
};
pub use duration::{classify, DurationBucket};
pub use payout::{calculate as calculate_payout, Bounded, Payout};
pub use selector::{
    best_by_bucket, best_quote, QuoteSelector, Selection, SelectionCriteria, SelectionMode,
};
pub use sizer::{CeilingCheck, CeilingGap, PositionSizer, SizedQuote};
pub use venue::VenueClient;
