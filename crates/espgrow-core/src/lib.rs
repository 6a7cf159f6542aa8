// espgrow-core: state mirrors and optimistic control between espgrow-api and front ends.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod schedule;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::Command;
pub use command::requests::*;
pub use config::ControllerConfig;
pub use controller::Controller;
pub use error::CoreError;
pub use schedule::ScheduleZone;
pub use store::{DeviceStore, Keyed, RuleStore, SensorStore, SettingsStore, SystemStore};
pub use stream::{EntityStream, Snapshot};

pub use espgrow_api::{ConfigBundle, ConnectionState, TelemetryPoint};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Devices
    ControlMethod, ControlMode, Device, DeviceType,
    // Sensors
    HistoryRange, HistorySeries, PpfdCalibration, Sensor, SensorReading, SensorType,
    // Rules
    AutomationRule, ComparisonOperator, RuleAction, RuleKind,
    // System
    ControllerSettings, OtaState, OtaStatus, SystemInfo,
};
