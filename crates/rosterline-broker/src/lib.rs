//! Stream transport for asynchronous request ingestion.
//!
//! [`StreamBroker`] is the behavioral contract a broker must satisfy;
//! [`InMemoryBroker`] is the in-process implementation used for local
//! runs and tests. [`RequestProducer`] and [`StreamConsumer`] sit on
//! either side of the contract.

pub mod broker;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod producer;
pub mod stream;

pub use broker::{MessageId, StreamBroker, StreamMessage};
pub use consumer::StreamConsumer;
pub use error::BrokerError;
pub use memory::InMemoryBroker;
pub use producer::RequestProducer;
pub use stream::{StreamKey, REQUEST_STREAMS};
