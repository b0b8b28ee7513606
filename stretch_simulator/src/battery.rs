use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stretch_shared::{BatteryMonitor, JointError};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimBatteryParams {
    pub start_voltage: f64,
    /// Voltage lost per reading, standing in for the load of idle motion (V)
    pub drain_per_read_v: f64,
    pub floor_voltage: f64,
}

impl Default for SimBatteryParams {
    fn default() -> Self {
        Self {
            start_voltage: 12.6,
            drain_per_read_v: 0.05,
            floor_voltage: 10.5,
        }
    }
}

/// Pack that discharges a fixed amount every time it is read.
#[derive(Debug, Clone)]
pub struct SimulatedBattery {
    voltage: f64,
    params: SimBatteryParams,
}

impl SimulatedBattery {
    pub fn new(params: SimBatteryParams) -> Self {
        Self {
            voltage: params.start_voltage,
            params,
        }
    }
}

#[async_trait]
impl BatteryMonitor for SimulatedBattery {
    async fn voltage(&mut self) -> Result<f64, JointError> {
        let reading = self.voltage;
        self.voltage = (self.voltage - self.params.drain_per_read_v).max(self.params.floor_voltage);
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_down_to_floor() {
        let mut battery = SimulatedBattery::new(SimBatteryParams {
            start_voltage: 11.0,
            drain_per_read_v: 0.3,
            floor_voltage: 10.5,
        });
        assert_eq!(battery.voltage().await.unwrap(), 11.0);
        assert!((battery.voltage().await.unwrap() - 10.7).abs() < 1e-9);
        assert_eq!(battery.voltage().await.unwrap(), 10.5);
        assert_eq!(battery.voltage().await.unwrap(), 10.5);
    }
}
