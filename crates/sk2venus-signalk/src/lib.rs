//! # sk2venus-signalk
//!
//! The Signal K side of the bridge.
//!
//! - Delta model and stream protocol messages with their codec
//! - [`SelfStore`] holding the latest self-vessel values
//! - [`DeltaRouter`], the event source and value lookup the dispatcher uses
//! - [`SignalKClient`], a reconnecting WebSocket stream client

pub mod client;
pub mod codec;
pub mod messages;
pub mod model;
pub mod router;
pub mod store;

pub use client::{ClientConfig, ClientError, SignalKClient};
pub use codec::{decode_server_message, encode_client_message, CodecError};
pub use messages::{ClientMessage, HelloMessage, ServerMessage, SubscribeRequest};
pub use model::{Delta, PathValue, Source, Update};
pub use router::{watch_pattern, DeltaRouter};
pub use store::SelfStore;
