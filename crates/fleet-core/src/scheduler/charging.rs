//! Charging admission and progression.

use tracing::{debug, info, warn};

use super::{Scheduler, TickReport};
use crate::models::{Admission, ChargerId, ChargingQueue, DroneId, DroneStatus};

impl Scheduler {
    /// Present a drone to a charger. Idempotent for drones already queued there.
    pub(super) fn admit(&mut self, drone_id: DroneId, charger_id: ChargerId) -> Option<Admission> {
        let admission = self.charger_mut(charger_id)?.queue.admit(drone_id);
        let drone = self.drones.get_mut(&drone_id)?;
        drone.charger = Some(charger_id);
        drone.route.clear();
        drone.target_index = 0;
        drone.remaining_m = 0.0;
        drone.eta_s = 0;
        drone.cruise_status = DroneStatus::Idle;
        drone.status = match admission {
            Admission::Charging => DroneStatus::Charging,
            Admission::Waiting => DroneStatus::Waiting,
        };
        debug!(drone_id = %drone_id, charger = %charger_id, ?admission, "Drone admitted to charger");
        Some(admission)
    }

    /// Charge every occupied slot, release full drones, then promote waiting ones.
    pub(super) fn process_charging(&mut self, report: &mut TickReport) {
        let rate = self.rules.charge_rate_pct;
        let charger_ids: Vec<ChargerId> = self.charger_stops().iter().map(|stop| stop.id).collect();

        for charger_id in charger_ids {
            let charging = match self.charger(charger_id) {
                Some(charger) => charger.queue.charging.clone(),
                None => continue,
            };
            for drone_id in charging {
                let full = match self.drones.get_mut(&drone_id) {
                    Some(drone) => {
                        drone.battery_pct = (drone.battery_pct + rate).min(100.0);
                        drone.status = DroneStatus::Charging;
                        drone.battery_pct >= 100.0
                    }
                    None => {
                        warn!(drone_id = %drone_id, charger = %charger_id, "Unknown drone in charging slot");
                        true
                    }
                };
                if full {
                    if let Some(charger) = self.charger_mut(charger_id) {
                        charger.queue.release(drone_id);
                    }
                    if self.drones.contains_key(&drone_id) {
                        self.finish_charging(drone_id);
                        report.fully_charged += 1;
                    }
                }
            }
            self.promote_at(charger_id);
        }
    }

    fn promote_at(&mut self, charger_id: ChargerId) {
        let promoted = match self.charger_mut(charger_id) {
            Some(charger) => charger.queue.promote(),
            None => return,
        };
        for drone_id in promoted {
            if let Some(drone) = self.drones.get_mut(&drone_id) {
                drone.status = DroneStatus::Charging;
                debug!(drone_id = %drone_id, charger = %charger_id, "Promoted to charging slot");
            }
        }
    }

    /// Fill free slots on every charger.
    pub(super) fn promote_waiting(&mut self) {
        let ids: Vec<ChargerId> = self.charger_stops().iter().map(|stop| stop.id).collect();
        for id in ids {
            self.promote_at(id);
        }
    }

    /// A drone left its slot at 100%: resume the order leg, plan the rest of the order, or park.
    fn finish_charging(&mut self, drone_id: DroneId) {
        let Some(drone) = self.drones.get_mut(&drone_id) else {
            return;
        };
        drone.charger = None;
        if !drone.resume_route.is_empty() {
            let resume = std::mem::take(&mut drone.resume_route);
            drone.set_route(resume, DroneStatus::Enroute);
            info!(drone_id = %drone_id, "Charged, resuming route");
            return;
        }

        let order_id = drone.order_id;
        match order_id.filter(|id| self.is_active(*id)) {
            Some(order_id) => {
                if self.continue_order(drone_id, order_id) {
                    info!(drone_id = %drone_id, order_id = %order_id, "Charged, replanned rest of order");
                }
            }
            None => {
                if let Some(drone) = self.drones.get_mut(&drone_id) {
                    drone.park();
                }
                info!(drone_id = %drone_id, "Charged, now idle");
            }
        }
    }

    /// Make queue membership agree with drone state after a restore.
    pub(super) fn rebuild_queues(&mut self) {
        let ids: Vec<ChargerId> = self.charger_stops().iter().map(|stop| stop.id).collect();
        for charger_id in &ids {
            let Some(charger) = self.charger_mut(*charger_id) else {
                continue;
            };
            let capacity = charger.queue.capacity;
            let previous = std::mem::replace(&mut charger.queue, ChargingQueue::new(capacity));
            let ordered: Vec<DroneId> = previous
                .charging
                .into_iter()
                .chain(previous.waiting)
                .collect();
            for drone_id in ordered {
                let belongs = self.drones.get(&drone_id).is_some_and(|drone| {
                    drone.charger == Some(*charger_id)
                        && matches!(drone.status, DroneStatus::Charging | DroneStatus::Waiting)
                });
                if belongs {
                    self.admit(drone_id, *charger_id);
                }
            }
        }
        // parked drones missing from every queue rejoin at the back
        let stray: Vec<(DroneId, Option<ChargerId>)> = self
            .drones
            .values()
            .filter(|drone| matches!(drone.status, DroneStatus::Charging | DroneStatus::Waiting))
            .map(|drone| (drone.id, drone.charger))
            .collect();
        for (drone_id, charger_id) in stray {
            let admitted = match charger_id {
                Some(charger_id) => {
                    let queued = self
                        .charger(charger_id)
                        .is_some_and(|charger| charger.queue.contains(drone_id));
                    queued || self.admit(drone_id, charger_id).is_some()
                }
                None => false,
            };
            if !admitted {
                if let Some(drone) = self.drones.get_mut(&drone_id) {
                    drone.charger = None;
                    drone.status = DroneStatus::Idle;
                    drone.cruise_status = DroneStatus::Idle;
                }
            }
        }
    }
}
