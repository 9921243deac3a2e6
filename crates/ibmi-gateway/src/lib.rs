//! C1 (Gateway Client) + C4 (Connection-Pool Manager): talks WebSocket/JSON
//! to the external IBM i database gateway and owns the keyed pool
//! lifecycle on top of it.

pub mod client;
pub mod error;
pub mod pool;

pub use client::{
    ColumnMeta, Credentials, GatewayClient, GatewayResult, PoolHandle, PoolSizes, QueryHandle,
    WsGatewayClient,
};
pub use error::GatewayError;
pub use pool::{AggregatedResult, HealthRecord, HealthStatus, Identity, PoolManager};
