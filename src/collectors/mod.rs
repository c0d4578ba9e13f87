/// Payload decoding into typed case events
pub mod decoder;

/// Payload sources and the background collector that feeds the ingestion loop
pub mod payload_source;

pub use decoder::decode;
pub use payload_source::{LineSource, MemorySource, PayloadSource, SourceCollector};
