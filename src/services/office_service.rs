// WorkHole/backend-api/src/services/office_service.rs
use crate::error_handler::ServiceError;
use crate::models::{NewOfficeLocation, OfficeLocation, SetOfficeLocationPayload};
use crate::schema::office_locations;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::sync::{Arc, RwLock};

const OFFICE_ROW_ID: i32 = 1;

/// The single active office, cached in process. Readers get either the old
/// or the new value as a whole; a replacement is one pointer swap.
#[derive(Default)]
pub struct OfficeRegistry {
    current: RwLock<Option<Arc<OfficeLocation>>>,
}

impl OfficeRegistry {
    pub fn current(&self) -> Option<Arc<OfficeLocation>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, office: Option<OfficeLocation>) {
        let next = office.map(Arc::new);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

/// Loads the stored office into the registry at startup.
pub async fn load_office(
    conn: &mut AsyncPgConnection,
    registry: &OfficeRegistry,
) -> Result<Option<Arc<OfficeLocation>>, ServiceError> {
    let office = office_locations::table
        .find(OFFICE_ROW_ID)
        .select(OfficeLocation::as_select())
        .first::<OfficeLocation>(conn)
        .await
        .optional()?;

    match &office {
        Some(o) => log::info!("Office location '{}' loaded", o.name),
        None => log::warn!("No office location configured; clock-ins will be classified as home"),
    }
    registry.replace(office);
    Ok(registry.current())
}

fn validate(payload: &SetOfficeLocationPayload) -> Result<(), ServiceError> {
    if !(-90.0..=90.0).contains(&payload.latitude) {
        return Err(ServiceError::bad_request("latitude must be between -90 and 90"));
    }
    if !(-180.0..=180.0).contains(&payload.longitude) {
        return Err(ServiceError::bad_request("longitude must be between -180 and 180"));
    }
    if payload.name.trim().is_empty() {
        return Err(ServiceError::bad_request("office name cannot be empty"));
    }
    if let Some(radius) = payload.radius {
        if radius.is_nan() || radius <= 0.0 {
            return Err(ServiceError::bad_request("radius must be positive"));
        }
    }
    Ok(())
}

/// Replaces the office record and then the cached copy.
pub async fn set_office_location(
    conn: &mut AsyncPgConnection,
    registry: &OfficeRegistry,
    payload: SetOfficeLocationPayload,
    now: DateTime<Utc>,
) -> Result<OfficeLocation, ServiceError> {
    validate(&payload)?;

    let new_office = NewOfficeLocation {
        id: OFFICE_ROW_ID,
        name: payload.name.trim().to_string(),
        address: payload.address,
        latitude: payload.latitude,
        longitude: payload.longitude,
        radius_meters: payload.radius,
        updated_at: now,
    };

    let saved = diesel::insert_into(office_locations::table)
        .values(&new_office)
        .on_conflict(office_locations::id)
        .do_update()
        .set(&new_office)
        .returning(OfficeLocation::as_returning())
        .get_result::<OfficeLocation>(conn)
        .await?;

    registry.replace(Some(saved.clone()));
    log::info!(
        "Office location set to '{}' ({}, {})",
        saved.name,
        saved.latitude,
        saved.longitude
    );
    Ok(saved)
}
