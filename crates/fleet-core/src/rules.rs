//! Tunable thresholds for the fleet scheduler.

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetRules {
    /// Simulated seconds per tick
    pub tick_secs: f64,
    /// Cruise speed in still air (m/s)
    pub base_speed_mps: f64,
    /// Speed floor regardless of wind (m/s)
    pub min_speed_mps: f64,
    /// Speed lost per m/s of wind
    pub wind_penalty: f64,
    /// Proximity bubble; a step ending closer than this to another airborne drone is held
    pub collision_radius_m: f64,
    /// At or below this battery a flying drone diverts to the nearest charger
    pub low_battery_pct: f64,
    /// At or below this battery an idle or holding drone goes to recharge
    pub recharge_pct: f64,
    /// Battery gained per tick while in a charging slot
    pub charge_rate_pct: f64,
    /// Max distance between a route point and a charger for the point to count as a stop
    pub charger_snap_m: f64,
    /// Positions kept in each drone's history
    pub history_len: usize,
}

impl Default for FleetRules {
    fn default() -> Self {
        Self {
            tick_secs: 1.0,
            base_speed_mps: 15.0,
            min_speed_mps: 5.0,
            wind_penalty: 0.3,
            collision_radius_m: 8.0,
            low_battery_pct: 5.0,
            recharge_pct: 20.0,
            charge_rate_pct: 4.0,
            charger_snap_m: 5.0,
            history_len: 50,
        }
    }
}

impl FleetRules {
    /// Distance covered in one tick at the given wind speed.
    pub fn step_distance_m(&self, wind_mps: f64) -> f64 {
        let speed = (self.base_speed_mps - self.wind_penalty * wind_mps).max(self.min_speed_mps);
        speed * self.tick_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wind_slows_drones_down_to_the_floor() {
        let rules = FleetRules::default();
        assert!((rules.step_distance_m(0.0) - 15.0).abs() < 1e-9);
        assert!((rules.step_distance_m(10.0) - 12.0).abs() < 1e-9);
        assert!((rules.step_distance_m(40.0) - 5.0).abs() < 1e-9);
    }
}
