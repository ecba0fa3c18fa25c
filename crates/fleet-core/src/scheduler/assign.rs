//! Order assignment, cancellation and destination updates.

use tracing::{debug, info, warn};

use super::{Scheduler, STOP_REACHED_M};
use crate::error::{FleetError, Result};
use crate::models::{ChargerId, DroneId, DroneStatus, DroneType, Order, OrderId, OrderStatus};
use crate::planner::{plan_with_charging, ChargePlan};
use crate::spatial::GeoPoint;

#[derive(Debug, Clone, Copy)]
enum Source {
    Idle(DroneId),
    Inventory,
    Fresh,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    source: Source,
    drone_type: DroneType,
    position: GeoPoint,
    battery_pct: f64,
}

impl Scheduler {
    /// Try to assign every queued order. Returns how many were assigned.
    pub(super) fn assign_orders(&mut self) -> usize {
        if self.graph.is_none() {
            return 0;
        }
        let queued: Vec<OrderId> = self
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Queued)
            .map(|order| order.id)
            .collect();

        let mut assigned = 0;
        for order_id in queued {
            match self.assign_order(order_id) {
                Ok(drone_id) => {
                    assigned += 1;
                    info!(order_id = %order_id, drone_id = %drone_id, "Order assigned");
                }
                Err(err) if err.is_routing_failure() => {
                    debug!(order_id = %order_id, error = %err, "Order stays queued")
                }
                Err(err) => warn!(order_id = %order_id, error = %err, "Order stays queued"),
            }
        }
        assigned
    }

    fn assign_order(&mut self, order_id: OrderId) -> Result<DroneId> {
        let order = self
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| FleetError::OrderNotFound(order_id.to_string()))?;
        let candidate = self.pick_candidate(&order);

        // stops the candidate already stands on count as reached
        let reached = order
            .stops()
            .take_while(|stop| stop.distance_m(&candidate.position) <= STOP_REACHED_M)
            .count();
        let waypoints: Vec<GeoPoint> = order.stops().skip(reached).copied().collect();
        let plan = self.plan_for(
            candidate.drone_type,
            candidate.position,
            order.end,
            &waypoints,
            candidate.battery_pct,
        )?;
        if let Some(warning) = &plan.warning {
            warn!(order_id = %order_id, %warning, "Assigned with warning");
        }

        // commit only once a route exists, so failed plans never consume inventory
        let drone_id = match candidate.source {
            Source::Idle(id) => id,
            Source::Inventory => {
                if let Some(count) = self.inventory.get_mut(&candidate.drone_type) {
                    *count = count.saturating_sub(1);
                }
                self.add_drone(candidate.drone_type, candidate.position, candidate.battery_pct)
            }
            Source::Fresh => {
                self.add_drone(candidate.drone_type, candidate.position, candidate.battery_pct)
            }
        };
        let length_m = plan.path.length_m;
        if let Some(drone) = self.drones.get_mut(&drone_id) {
            drone.order_id = Some(order_id);
        }
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.status = OrderStatus::Assigned;
            order.drone_id = Some(drone_id);
            order.route_length_m = Some(length_m);
            order.stops_done = reached;
        }
        self.apply_plan(drone_id, plan, DroneStatus::Enroute);
        Ok(drone_id)
    }

    /// Nearest idle drone, else a unit from base storage (matching type first),
    /// else a fresh unit at the order start.
    fn pick_candidate(&self, order: &Order) -> Candidate {
        let nearest_idle = self
            .drones
            .values()
            .filter(|drone| drone.status == DroneStatus::Idle && drone.order_id.is_none())
            .min_by(|a, b| {
                a.position
                    .distance_m(&order.start)
                    .total_cmp(&b.position.distance_m(&order.start))
            });
        if let Some(drone) = nearest_idle {
            return Candidate {
                source: Source::Idle(drone.id),
                drone_type: drone.drone_type,
                position: drone.position,
                battery_pct: drone.battery_pct,
            };
        }

        let wanted = DroneType::for_order(order.order_type);
        let stocked = std::iter::once(wanted)
            .chain(DroneType::ALL)
            .find(|drone_type| self.inventory.get(drone_type).is_some_and(|count| *count > 0));
        match stocked {
            Some(drone_type) => Candidate {
                source: Source::Inventory,
                drone_type,
                position: self.base.position,
                battery_pct: 100.0,
            },
            None => Candidate {
                source: Source::Fresh,
                drone_type: wanted,
                position: order.start,
                battery_pct: order.battery_level,
            },
        }
    }

    /// Energy-aware plan for a drone of `drone_type` at `battery_pct`.
    pub(super) fn plan_for(
        &self,
        drone_type: DroneType,
        position: GeoPoint,
        end: GeoPoint,
        waypoints: &[GeoPoint],
        battery_pct: f64,
    ) -> Result<ChargePlan> {
        let graph = self.graph.as_ref().ok_or(FleetError::GraphNotLoaded)?;
        plan_with_charging(
            graph,
            position,
            end,
            waypoints,
            drone_type.profile().battery_range_m,
            battery_pct,
            &self.charger_stops(),
        )
    }

    /// Split a route at its first charger strictly between the ends.
    fn split_at_charger(&self, points: Vec<GeoPoint>) -> (Vec<GeoPoint>, Vec<GeoPoint>, Option<ChargerId>) {
        let stops = self.charger_stops();
        let snap = self.rules.charger_snap_m;
        let inner = points.len().saturating_sub(2);
        let hit = points.iter().enumerate().skip(1).take(inner).find_map(|(i, point)| {
            stops
                .iter()
                .find(|stop| stop.position.distance_m(point) <= snap)
                .map(|stop| (i, stop.id))
        });
        match hit {
            Some((i, charger)) => {
                let resume = points[i..].to_vec();
                let mut route = points;
                route.truncate(i + 1);
                (route, resume, Some(charger))
            }
            None => (points, Vec::new(), None),
        }
    }

    /// Give a drone a planned route, parking the remainder after a charging
    /// stop. A stop at the drone's own position starts charging right away
    /// (unless already full) with the whole route left to resume.
    pub(super) fn apply_plan(&mut self, drone_id: DroneId, plan: ChargePlan, status: DroneStatus) {
        let snap = self.rules.charger_snap_m;
        let charge_here = plan.via.filter(|charger_id| {
            match (self.charger(*charger_id), self.drones.get(&drone_id)) {
                (Some(charger), Some(drone)) => {
                    drone.battery_pct < 100.0 && charger.position.distance_m(&drone.position) <= snap
                }
                _ => false,
            }
        });
        if let Some(charger_id) = charge_here {
            if let Some(drone) = self.drones.get_mut(&drone_id) {
                drone.resume_route = plan.path.points;
            }
            self.admit(drone_id, charger_id);
            info!(drone_id = %drone_id, charger = %charger_id, "Charging before departure");
            return;
        }

        let (route, resume, stop) = self.split_at_charger(plan.path.points);
        if let Some(drone) = self.drones.get_mut(&drone_id) {
            drone.set_route(route, status);
            drone.resume_route = resume;
            drone.charger = stop;
        }
    }

    /// Plan the unfinished part of an order from where the drone is now: the
    /// stops not yet reached, then the end. Holds and returns false when no
    /// plan works.
    pub(super) fn continue_order(&mut self, drone_id: DroneId, order_id: OrderId) -> bool {
        self.mark_stops_reached(drone_id);
        let (Some(drone), Some(order)) = (self.drones.get(&drone_id), self.orders.get(&order_id)) else {
            return false;
        };
        let (drone_type, position, battery, holding) = (
            drone.drone_type,
            drone.position,
            drone.battery_pct,
            drone.status == DroneStatus::Holding,
        );
        let end = order.end;
        match self.plan_for(drone_type, position, end, &order.remaining_stops(), battery) {
            Ok(plan) => {
                if holding {
                    info!(drone_id = %drone_id, "Route clear again, leaving holding");
                }
                self.apply_plan(drone_id, plan, DroneStatus::Enroute);
                true
            }
            Err(err) => {
                if !holding {
                    warn!(drone_id = %drone_id, order_id = %order_id, error = %err, "Cannot continue order, holding");
                }
                self.hold(drone_id, end, DroneStatus::Enroute);
                false
            }
        }
    }

    /// Keep `end` as the goal and retry planning on later ticks.
    pub(super) fn hold(&mut self, drone_id: DroneId, end: GeoPoint, cruise: DroneStatus) {
        if let Some(drone) = self.drones.get_mut(&drone_id) {
            drone.route = vec![end];
            drone.resume_route.clear();
            drone.charger = None;
            drone.target_index = 0;
            drone.status = DroneStatus::Holding;
            drone.cruise_status = cruise;
        }
    }

    /// Cancel an order. A flying drone stops and parks where it is; a drone
    /// in a charger stays there and just forgets the rest of the order.
    pub fn cancel_order(&mut self, order_id: OrderId) -> Result<()> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| FleetError::OrderNotFound(order_id.to_string()))?;
        if order.status.is_terminal() {
            return Ok(());
        }
        order.status = OrderStatus::Cancelled;
        let drone_id = order.drone_id;

        if let Some(drone) = drone_id.and_then(|id| self.drones.get_mut(&id)) {
            if drone.order_id == Some(order_id) {
                drone.order_id = None;
                match drone.status {
                    DroneStatus::Charging | DroneStatus::Waiting => drone.resume_route.clear(),
                    _ => drone.park(),
                }
            }
        }
        info!(order_id = %order_id, drone_id = ?drone_id, "Order cancelled");
        Ok(())
    }

    /// Change where an order goes. An assigned drone in flight is replanned
    /// from its current position; on planning failure nothing changes.
    pub fn update_destination(&mut self, order_id: OrderId, end: GeoPoint) -> Result<()> {
        if !end.is_valid() {
            return Err(FleetError::InvalidPoint {
                lat: end.lat,
                lon: end.lon,
            });
        }
        let order = self
            .orders
            .get(&order_id)
            .ok_or_else(|| FleetError::OrderNotFound(order_id.to_string()))?;
        if order.status.is_terminal() {
            return Err(FleetError::OrderClosed(order_id.to_string()));
        }
        let stops = order.remaining_stops();
        let drone = order
            .drone_id
            .and_then(|id| self.drones.get(&id))
            .filter(|drone| drone.order_id == Some(order_id));

        match drone {
            None => {}
            Some(drone) if matches!(drone.status, DroneStatus::Charging | DroneStatus::Waiting) => {
                let drone_id = drone.id;
                if let Some(drone) = self.drones.get_mut(&drone_id) {
                    // replanned to the new end once charged
                    drone.resume_route.clear();
                }
            }
            Some(drone) => {
                let (drone_id, drone_type, position, battery) =
                    (drone.id, drone.drone_type, drone.position, drone.battery_pct);
                let plan = self.plan_for(drone_type, position, end, &stops, battery)?;
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.route_length_m = Some(plan.path.length_m);
                }
                self.apply_plan(drone_id, plan, DroneStatus::Enroute);
            }
        }

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.end = end;
        }
        info!(order_id = %order_id, lat = end.lat, lon = end.lon, "Order destination updated");
        Ok(())
    }
}
