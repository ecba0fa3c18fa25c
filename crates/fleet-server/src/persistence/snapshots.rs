//! Fleet snapshot storage.

use anyhow::Result;
use chrono::Utc;
use fleet_core::Snapshot;
use sqlx::Row;

use super::Database;

const LATEST_KEY: &str = "latest";

/// Upsert the latest snapshot.
pub async fn save_snapshot(db: &Database, snapshot: &Snapshot) -> Result<()> {
    let payload = serde_json::to_string(snapshot)?;
    sqlx::query(
        r#"
        INSERT INTO snapshots (key, payload, saved_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            payload = excluded.payload,
            saved_at = excluded.saved_at
        "#,
    )
    .bind(LATEST_KEY)
    .bind(payload)
    .bind(Utc::now().to_rfc3339())
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Load the latest snapshot, if one was saved.
pub async fn load_snapshot(db: &Database) -> Result<Option<Snapshot>> {
    let row = sqlx::query("SELECT payload FROM snapshots WHERE key = ?")
        .bind(LATEST_KEY)
        .fetch_optional(db.pool())
        .await?;
    match row {
        Some(row) => {
            let payload: String = row.try_get("payload")?;
            Ok(Some(serde_json::from_str(&payload)?))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use fleet_core::{ChargerSpec, DroneType, FleetRules, GeoPoint, OrderRequest, Scheduler};

    #[tokio::test]
    async fn snapshot_survives_a_round_trip_through_sqlite() {
        let db = init_database(":memory:", 1).await.unwrap();
        assert!(load_snapshot(&db).await.unwrap().is_none());

        let base = GeoPoint::new(55.75, 37.61);
        let mut sched = Scheduler::new(
            FleetRules::default(),
            ChargerSpec {
                name: "Base".into(),
                position: base,
                capacity: 2,
            },
            Default::default(),
        );
        sched.add_drone(DroneType::Operator, base, 42.0);
        sched
            .submit_order(OrderRequest::new(base, GeoPoint::new(55.76, 37.62)))
            .unwrap();
        save_snapshot(&db, &sched.snapshot()).await.unwrap();
        save_snapshot(&db, &sched.snapshot()).await.unwrap();

        let restored = load_snapshot(&db).await.unwrap().unwrap();
        assert_eq!(restored.orders.len(), 1);
        assert_eq!(restored.drones.len(), 1);
        let drone = restored.drones.values().next().unwrap();
        assert_eq!(drone.battery_pct, 42.0);
        assert_eq!(drone.drone_type, DroneType::Operator);
    }
}
