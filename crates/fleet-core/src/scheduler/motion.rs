//! Per-tick drone motion, collision avoidance and battery handling.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{Scheduler, TickReport, STOP_REACHED_M};
use crate::models::{ChargerId, DroneId, DroneStatus, OrderStatus};
use crate::planner::plan_path;
use crate::spatial::GeoPoint;
use crate::zones::point_in_any;

const AMBIENT_TEMP_C: f64 = 20.0;
const FLYING_TEMP_C: f64 = 32.0;
const CHARGING_TEMP_C: f64 = 28.0;
const LINK_LOSS_PER_KM: f64 = 4.0;
const MIN_LINK_QUALITY: f64 = 10.0;

impl Scheduler {
    pub(super) fn advance_drones(&mut self, report: &mut TickReport) {
        let step_m = self.rules.step_distance_m(self.weather.wind_mps);
        let speed_mps = step_m / self.rules.tick_secs.max(f64::EPSILON);
        let ids: Vec<DroneId> = self.drones.keys().copied().collect();
        for id in ids {
            let Some(status) = self.drones.get(&id).map(|drone| drone.status) else {
                continue;
            };
            match status {
                DroneStatus::Holding => {
                    self.replan_to_end(id);
                }
                status if status.is_flying() => self.fly(id, step_m, report),
                _ => {}
            }
            self.check_battery(id, report);
            self.update_telemetry(id, speed_mps);
        }
    }

    fn fly(&mut self, id: DroneId, step_m: f64, report: &mut TickReport) {
        let Some(drone) = self.drones.get_mut(&id) else {
            return;
        };
        if drone.status == DroneStatus::Avoidance {
            drone.status = drone.cruise_status;
        }
        if drone.status == DroneStatus::LowBattery && drone.route.is_empty() {
            // stranded: check_battery keeps looking for a charger
            return;
        }
        let Some(target) = drone.current_target().copied() else {
            self.arrive(id, report);
            return;
        };

        if point_in_any(&self.zones, &target) {
            debug!(drone_id = %id, "Next waypoint is inside a no-fly zone, replanning");
            self.replan_to_end(id);
            return;
        }

        let position = drone.position;
        let profile = drone.profile();
        let dist = position.distance_m(&target);
        if dist <= step_m {
            drone.position = target;
            drone.target_index += 1;
            drone.battery_pct = (drone.battery_pct - profile.drain_pct(dist)).max(0.0);
            let finished = drone.target_index >= drone.route.len();
            self.mark_stops_reached(id);
            if finished {
                self.arrive(id, report);
            }
            return;
        }

        let next = position.move_towards(&target, step_m / dist);
        if self.collides(id, &next) {
            if let Some(drone) = self.drones.get_mut(&id) {
                drone.status = DroneStatus::Avoidance;
            }
            debug!(drone_id = %id, "Holding position to keep separation");
            return;
        }
        if let Some(drone) = self.drones.get_mut(&id) {
            drone.position = next;
            drone.battery_pct = (drone.battery_pct - profile.drain_pct(step_m)).max(0.0);
        }
    }

    /// True when `next` is inside the proximity bubble of another airborne drone.
    ///
    /// Parked drones are skipped so drones can leave and reach a shared charger,
    /// and a higher-numbered drone already in `avoidance` gives way so two
    /// drones meeting head-on cannot block each other forever.
    fn collides(&self, id: DroneId, next: &GeoPoint) -> bool {
        let radius = self.rules.collision_radius_m;
        self.drones.values().any(|other| {
            other.id != id
                && !other.status.is_parked()
                && !(other.status == DroneStatus::Avoidance && other.id > id)
                && other.position.distance_m(next) < radius
        })
    }

    /// Route finished: enter the charger queue, complete the order and park,
    /// or plan on if the order still has stops or the drone is short of its end.
    fn arrive(&mut self, id: DroneId, report: &mut TickReport) {
        let snap = self.rules.charger_snap_m;
        let Some(drone) = self.drones.get(&id) else {
            return;
        };
        let at_charger = drone.charger.filter(|charger_id| {
            self.charger(*charger_id)
                .is_some_and(|charger| charger.position.distance_m(&drone.position) <= snap)
        });
        if let Some(charger_id) = at_charger {
            if self.admit(id, charger_id).is_some() {
                report.arrived_at_charger += 1;
                return;
            }
        }

        let Some(drone) = self.drones.get(&id) else {
            return;
        };
        let (position, resume_left) = (drone.position, !drone.resume_route.is_empty());
        if let Some(order_id) = drone.order_id.filter(|order_id| self.is_active(*order_id)) {
            let unfinished = resume_left
                || self.orders.get(&order_id).is_some_and(|order| {
                    order.next_stop().is_some() || order.end.distance_m(&position) > STOP_REACHED_M
                });
            if unfinished {
                debug!(drone_id = %id, order_id = %order_id, "Route ended short of the order, replanning");
                self.continue_order(id, order_id);
                return;
            }
        }

        let Some(drone) = self.drones.get_mut(&id) else {
            return;
        };
        let order_id = drone.order_id.take();
        drone.park();
        if let Some(order) = order_id.and_then(|order_id| self.orders.get_mut(&order_id)) {
            if order.status == OrderStatus::Assigned {
                order.status = OrderStatus::Completed;
                order.completed_at = Some(Utc::now());
                report.completed += 1;
                info!(order_id = %order.id, drone_id = %id, "Order completed");
            }
        }
    }

    /// Plan again from the current position: the rest of the order for a
    /// drone on an order leg, else the end of the current route.
    /// Falls back to `holding` and returns false when no plan works.
    fn replan_to_end(&mut self, id: DroneId) -> bool {
        let Some(drone) = self.drones.get(&id) else {
            return false;
        };
        let heading_to_charger = drone.charger.is_some() && drone.resume_route.is_empty();
        if let Some(order_id) = drone.order_id.filter(|order_id| self.is_active(*order_id)) {
            if !heading_to_charger {
                return self.continue_order(id, order_id);
            }
        }
        let Some(end) = drone.route_end() else {
            return false;
        };
        let cruise = drone.cruise_status;
        let range_m = drone.profile().battery_range_m * drone.battery_pct / 100.0;
        let position = drone.position;

        let planned = match self.graph.as_ref() {
            Some(graph) => plan_path(graph, position, end, range_m, &[]),
            None => Err(crate::error::FleetError::GraphNotLoaded),
        };
        let Some(drone) = self.drones.get_mut(&id) else {
            return false;
        };
        match planned {
            Ok(path) => {
                let was_holding = drone.status == DroneStatus::Holding;
                drone.set_route(path.points, cruise);
                if was_holding {
                    info!(drone_id = %id, "Route clear again, leaving holding");
                }
                true
            }
            Err(err) => {
                if drone.status != DroneStatus::Holding {
                    warn!(drone_id = %id, error = %err, "No route around zone, holding");
                }
                drone.status = DroneStatus::Holding;
                false
            }
        }
    }

    fn check_battery(&mut self, id: DroneId, report: &mut TickReport) {
        let Some(drone) = self.drones.get_mut(&id) else {
            return;
        };
        let status = drone.status;
        if status.is_flying() && drone.battery_pct <= self.rules.low_battery_pct {
            let heading_to_charger = drone.charger.is_some() && !drone.route.is_empty();
            if heading_to_charger {
                drone.status = DroneStatus::LowBattery;
                drone.cruise_status = DroneStatus::LowBattery;
            } else {
                self.divert_to_charger(id, true, report);
            }
        } else if matches!(status, DroneStatus::Idle | DroneStatus::Holding)
            && drone.charger.is_none()
            && drone.battery_pct <= self.rules.recharge_pct
        {
            self.divert_to_charger(id, false, report);
        }
    }

    /// Send a drone to the nearest charger (straight-line), trying farther
    /// ones if no route to the nearest exists.
    fn divert_to_charger(&mut self, id: DroneId, low_battery: bool, report: &mut TickReport) {
        let Some(drone) = self.drones.get(&id) else {
            return;
        };
        let (position, battery, profile) = (drone.position, drone.battery_pct, drone.profile());
        let mut stops = self.charger_stops();
        stops.sort_by(|a, b| {
            a.position
                .distance_m(&position)
                .total_cmp(&b.position.distance_m(&position))
        });

        if let Some(nearest) = stops.first() {
            if nearest.position.distance_m(&position) <= self.rules.charger_snap_m {
                if self.admit(id, nearest.id).is_some() {
                    report.arrived_at_charger += 1;
                }
                return;
            }
        }

        let range_m = profile.battery_range_m * battery / 100.0;
        let found = self.graph.as_ref().and_then(|graph| {
            stops.iter().find_map(|stop| {
                plan_path(graph, position, stop.position, range_m, &[])
                    .ok()
                    .map(|path| (stop.id, path))
            })
        });

        let Some(drone) = self.drones.get_mut(&id) else {
            return;
        };
        match found {
            Some((charger_id, path)) => {
                let status = if low_battery {
                    DroneStatus::LowBattery
                } else if charger_id == ChargerId::Base {
                    DroneStatus::ReturnBase
                } else {
                    DroneStatus::ReturnCharge
                };
                drone.set_route(path.points, status);
                drone.resume_route.clear();
                drone.charger = Some(charger_id);
                info!(drone_id = %id, charger = %charger_id, battery = drone.battery_pct, ?status, "Heading to charger");
            }
            None if low_battery => {
                if drone.status != DroneStatus::LowBattery {
                    warn!(drone_id = %id, battery = drone.battery_pct, "Low battery and no charger reachable");
                }
                drone.route.clear();
                drone.resume_route.clear();
                drone.target_index = 0;
                drone.status = DroneStatus::LowBattery;
                drone.cruise_status = DroneStatus::LowBattery;
            }
            None => {}
        }
    }

    fn update_telemetry(&mut self, id: DroneId, speed_mps: f64) {
        let base = self.base.position;
        let history_len = self.rules.history_len;
        let Some(drone) = self.drones.get_mut(&id) else {
            return;
        };

        if drone.position_history.back() != Some(&drone.position) {
            drone.position_history.push_back(drone.position);
            while drone.position_history.len() > history_len {
                drone.position_history.pop_front();
            }
        }

        let target_temp = match drone.status {
            DroneStatus::Charging => CHARGING_TEMP_C,
            status if status.is_flying() => FLYING_TEMP_C,
            _ => AMBIENT_TEMP_C,
        };
        drone.temperature_c += (target_temp - drone.temperature_c) * 0.1;
        let km_from_base = drone.position.distance_m(&base) / 1_000.0;
        drone.link_quality = (100.0 - LINK_LOSS_PER_KM * km_from_base).clamp(MIN_LINK_QUALITY, 100.0);

        let remaining = match drone.route.get(drone.target_index..) {
            Some(rest) if !rest.is_empty() && drone.status != DroneStatus::Holding => {
                drone.position.distance_m(&rest[0])
                    + rest.windows(2).map(|pair| pair[0].distance_m(&pair[1])).sum::<f64>()
            }
            _ => 0.0,
        };
        drone.remaining_m = remaining;
        drone.eta_s = if remaining > 0.0 {
            (remaining / speed_mps.max(0.1)).round() as u64
        } else {
            0
        };
    }
}
