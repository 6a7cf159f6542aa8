// espgrow-api: wire layer for espgrow environmental controllers.

pub mod backup;
pub mod channel;
pub mod error;
pub mod frame;
mod registry;
pub mod telemetry;
pub mod transport;

pub use backup::{BackupClient, ConfigBundle};
pub use channel::{Channel, ChannelConfig, ConnectionState};
pub use error::Error;
pub use frame::EventFrame;
pub use registry::{Handler, Subscription};
pub use telemetry::TelemetryPoint;
pub use transport::{Connector, Transport, WebSocketConnector};
