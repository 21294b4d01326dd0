//! JSON-RPC/WebSocket gateway over an identity-routed backend transport.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod messages;
pub mod observability;
pub mod transport;
pub mod worker;

pub use config::schema::GatewayConfig;
pub use gateway::{MethodRegistry, QueryTranslator, WebGateway};
pub use lifecycle::Shutdown;
pub use worker::{RequestWorker, SendWorker};
