// WorkHole/backend-api/src/services/mod.rs
//! Persistence around the pure rules in `domain`. Each operation loads the
//! rows it needs, applies a domain rule, writes the outcome with a
//! conditional statement and hands side effects to the notifier.

pub mod attendance_service;
pub mod break_service;
pub mod employee_directory;
pub mod leave_service;
pub mod office_service;
pub mod report_service;
pub mod timer_service;

use crate::config::AppConfig;
use crate::domain::geofence::Geofence;
use crate::notify::Notifier;
use chrono::Weekday;
use office_service::OfficeRegistry;

/// Policy defaults applied where the employee directory has gaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub default_office_radius_meters: f64,
    pub default_utc_offset_minutes: i32,
    pub annual_leave_entitlement: i32,
    pub heat_chart_week_start: Weekday,
}

impl From<&AppConfig> for Settings {
    fn from(config: &AppConfig) -> Self {
        Settings {
            default_office_radius_meters: config.default_office_radius_meters,
            default_utc_offset_minutes: config.default_utc_offset_minutes,
            annual_leave_entitlement: config.annual_leave_entitlement,
            heat_chart_week_start: config.heat_chart_week_start,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_office_radius_meters: 50.0,
            default_utc_offset_minutes: 0,
            annual_leave_entitlement: crate::domain::leave::DEFAULT_ANNUAL_ENTITLEMENT,
            heat_chart_week_start: Weekday::Sun,
        }
    }
}

/// Process-wide state shared by handlers and the sweeper.
pub struct AppContext {
    pub settings: Settings,
    pub office: OfficeRegistry,
    pub notifier: Notifier,
}

impl AppContext {
    pub fn new(settings: Settings, notifier: Notifier) -> Self {
        AppContext {
            settings,
            office: OfficeRegistry::default(),
            notifier,
        }
    }

    pub fn geofence(&self) -> Option<Geofence> {
        self.office
            .current()
            .map(|office| Geofence::for_office(&office, self.settings.default_office_radius_meters))
    }
}
