use crate::joint::JointError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[async_trait]
pub trait BatteryMonitor: Send {
    /// Pack voltage (V).
    async fn voltage(&mut self) -> Result<f64, JointError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub battery_voltage: f64,
    pub battery_percentage: f64,
}

impl BatteryInfo {
    /// Voltage reported as 100%.
    pub const FULL_VOLTAGE: f64 = 14.5;

    pub fn from_voltage(voltage: f64) -> Self {
        Self {
            battery_voltage: (voltage * 100.0).round() / 100.0,
            battery_percentage: (voltage / Self::FULL_VOLTAGE * 100.0).round(),
        }
    }

    pub async fn read<B: BatteryMonitor + ?Sized>(monitor: &mut B) -> Result<Self, JointError> {
        Ok(Self::from_voltage(monitor.voltage().await?))
    }
}

impl fmt::Display for BatteryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Battery Level: {}V ({}%)",
            self.battery_voltage, self.battery_percentage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_relative_to_full_pack() {
        let info = BatteryInfo::from_voltage(12.6749);
        assert_eq!(info.battery_voltage, 12.67);
        assert_eq!(info.battery_percentage, 87.0);
        assert_eq!(info.to_string(), "Battery Level: 12.67V (87%)");
    }
}
