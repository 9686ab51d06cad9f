//! 网关：研究进度事件的连接扇出（带历史回放），以及 axum HTTP / WebSocket 外壳（web feature）

mod hub;
#[cfg(feature = "web")]
pub mod server;

pub use hub::{ChannelSink, ConnectionHub, ConnectionId, DeliveryError, EventSink};
#[cfg(feature = "web")]
pub use server::{router, serve, AppState};
