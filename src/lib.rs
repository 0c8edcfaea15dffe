//! # esplink
//!
//! Client engine for the ESP binary protocol spoken by the V1 accessory.
//!
//! The crate is a protocol stack, bottom to top:
//!
//! - **Framing** ([`protocol`]): a resynchronizing scanner that turns a noisy
//!   transport byte stream into validated wire frames and back.
//! - **Packets** ([`packets`]): typed decode/encode of frames into request,
//!   response and unknown packets, with the round-trip guarantee that
//!   re-encoding a decoded packet reproduces its exact wire bytes.
//! - **Dispatch** ([`dispatch`]): request/response correlation, multi-packet
//!   reassembly (alert tables, sweep sets) and notification fan-out.
//! - **Session** ([`session`]): one logical connection over one transport;
//!   serialized writes, lifecycle state machine, no-data watchdog.
//! - **Client** ([`EspClient`]): the typed request/subscribe surface
//!   applications call.
//!
//! ## Example
//!
//! ```ignore
//! use esplink::{EspClient, ClientConfig};
//! use esplink::transport::DemoTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), esplink::EspError> {
//!     let client = EspClient::connect(
//!         DemoTransport::builder().repeat(true).build(),
//!         ClientConfig::default(),
//!     ).await?;
//!
//!     let volts = client.request_battery_voltage().await?;
//!     println!("battery: {volts}V");
//!
//!     let mut alerts = client.alert_tables();
//!     while let Ok(table) = alerts.recv().await {
//!         println!("{} alert(s)", table.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod packets;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{ClientConfig, EspClient};
pub use error::EspError;
pub use packets::Packet;
pub use protocol::{DeviceId, PacketId};
pub use session::{ConnectionEvent, ConnectionState};
