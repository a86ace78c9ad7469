//! FIX log parsing: tokenizer, field decoder, order/execution correlator,
//! and the single-pass extraction pipeline.
//!
//! Data flows strictly forward, one line at a time:
//! tokenizer → decoder → correlator → emitter. No component looks ahead or
//! holds more than the current line plus the correlator's keyed store.

pub mod correlator;
pub mod extract;
pub mod message;
pub mod tokenizer;

pub use correlator::FillCorrelator;
pub use extract::{extract, extract_file, ExtractStats, FillWriter};
pub use message::{FixMessage, MsgType};
pub use tokenizer::tokenize;
