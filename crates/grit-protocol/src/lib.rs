//! Pack ingest and the smart HTTP fetch path for grit.
//!
//! This crate implements pkt-line framing, the pack file decoder, the
//! delta resolver, and the `git-upload-pack` fetch driver that feeds
//! objects into the `grit-storage` object database.

mod delta;
mod error;
mod fetch;
mod pack;
mod pktline;

pub use delta::{parse_delta, DeltaBase, DeltaRecord, Instruction};
pub use error::{ProtocolError, Result};
pub use fetch::{Credentials, FetchDriver, RefAdvertisement};
pub use pack::{PackParser, PackStore};
pub use pktline::{encode_data, encode_flush, Frame, FrameReader};
