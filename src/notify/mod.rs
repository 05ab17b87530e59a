//! Real-time notification fan-out — event hub and WebSocket/REST surface.

pub mod hub;
pub mod ws;

pub use hub::{Event, Liveness, NotificationHub, ProbeAction};
pub use ws::{ApiState, api_routes};
