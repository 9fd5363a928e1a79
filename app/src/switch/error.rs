use derive_more::derive::{Display, Error};

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SwitchError {
    #[display("Unknown device {address}")]
    UnknownDevice { address: String },

    #[display("Device {address} is unreachable")]
    Unreachable { address: String },

    #[display("Driver failure for {address}: {reason}")]
    DriverFailure { address: String, reason: String },

    #[display("Insufficient rights")]
    PermissionDenied,

    #[display("Invalid switch configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl SwitchError {
    pub fn unknown_device(address: &str) -> Self {
        SwitchError::UnknownDevice {
            address: address.to_owned(),
        }
    }

    pub fn unreachable(address: &str) -> Self {
        SwitchError::Unreachable {
            address: address.to_owned(),
        }
    }

    pub fn driver_failure(address: &str, error: &anyhow::Error) -> Self {
        SwitchError::DriverFailure {
            address: address.to_owned(),
            reason: format!("{error:#}"),
        }
    }
}
