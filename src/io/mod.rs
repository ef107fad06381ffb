//! IO modules - external collaborators and their adapters
//!
//! - `reader` - Card reader contract and scan result types
//! - `serial_reader` - Serial EM4100 card reader
//! - `scripted_reader` - Scripted reader for simulation and tests
//! - `store` - Record store contract
//! - `http_store` - REST collection record store
//! - `memory_store` - In-memory record store
//! - `history` - Session summaries to file (JSONL format)

pub mod history;
pub mod http_store;
pub mod memory_store;
pub mod reader;
pub mod scripted_reader;
pub mod serial_reader;
pub mod store;

// Re-export commonly used types
pub use history::SessionHistory;
pub use http_store::HttpRecordStore;
pub use memory_store::InMemoryRecordStore;
pub use reader::{CardReader, ScanOutcome, ScanResult};
pub use scripted_reader::{ScriptStep, ScriptedCardReader};
pub use serial_reader::SerialCardReader;
pub use store::RecordStore;
