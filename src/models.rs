use crate::domain::time_utils::hhmm_option;
use crate::schema::{
    attendance_days, break_sessions, break_types, device_events, employees, leave_requests,
    office_locations, timer_sessions,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::Write;
use uuid::Uuid;

// --- Text-backed enums ---
// Every status/location/type column is TEXT in Postgres and a closed enum here.

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("invalid {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = std::str::from_utf8(bytes.as_bytes())?;
                raw.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Early,
}
text_enum!(AttendanceStatus { Present => "present", Late => "late", Absent => "absent", Early => "early" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum WorkLocation {
    Office,
    Home,
}
text_enum!(WorkLocation { Office => "office", Home => "home" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Running,
    Paused,
    Completed,
    Cancelled,
}
text_enum!(TimerStatus {
    Running => "running",
    Paused => "paused",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl TimerStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TimerStatus::Running | TimerStatus::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum LeaveType {
    #[serde(rename = "Annual Leave")]
    Annual,
    #[serde(rename = "Sick Leave")]
    Sick,
    #[serde(rename = "Emergency Leave")]
    Emergency,
    #[serde(rename = "Unpaid Leave")]
    Unpaid,
}
text_enum!(LeaveType {
    Annual => "Annual Leave",
    Sick => "Sick Leave",
    Emergency => "Emergency Leave",
    Unpaid => "Unpaid Leave",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}
text_enum!(LeaveStatus { Pending => "pending", Approved => "approved", Rejected => "rejected" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceEventType {
    ClockIn,
    ClockOut,
}
text_enum!(DeviceEventType { ClockIn => "CLOCK_IN", ClockOut => "CLOCK_OUT" });

// Absent field -> None, explicit null -> Some(None).
fn deserialize_opt_opt_string<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer) {
        Ok(Some(s)) => Ok(Some(Some(s))),
        Ok(None) => Ok(Some(None)), // JSON null -> Some(None)
        Err(e) => Err(e),
    }
}

// --- Employee Model (read-only directory) ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = employees)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Employee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub shift_hours: Option<i32>,
    pub shift_start_local: Option<String>,
    pub utc_offset_minutes: Option<i32>,
    pub annual_leave_entitlement: Option<i32>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// --- Office Location Model ---
#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = office_locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OfficeLocation {
    #[serde(skip_serializing)]
    pub id: i32,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

// Used both for the insert and the ON CONFLICT update of the singleton row.
#[derive(Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = office_locations)]
#[diesel(treat_none_as_null = true)]
pub struct NewOfficeLocation {
    pub id: i32,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

// --- AttendanceDay Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = attendance_days)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AttendanceDay {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub work_date: NaiveDate,
    pub day_name: String,
    #[serde(with = "hhmm_option")]
    pub clock_in: Option<NaiveTime>,
    #[serde(with = "hhmm_option")]
    pub clock_out: Option<NaiveTime>,
    pub work_minutes: Option<i32>,
    pub status: AttendanceStatus,
    pub location: WorkLocation,
    pub is_overtime: bool,
    pub break_minutes: i32,
    pub office_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceDay {
    pub fn is_closed(&self) -> bool {
        self.clock_in.is_some() && self.clock_out.is_some()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = attendance_days)]
pub struct NewAttendanceDay {
    pub employee_id: Uuid,
    pub work_date: NaiveDate,
    pub day_name: String,
    pub clock_in: Option<NaiveTime>,
    pub status: AttendanceStatus,
    pub location: WorkLocation,
    pub office_name: Option<String>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = attendance_days)]
pub struct ClockInChangeset {
    pub day_name: String,
    pub clock_in: Option<NaiveTime>,
    pub status: AttendanceStatus,
    pub location: WorkLocation,
    pub office_name: Option<Option<String>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = attendance_days)]
pub struct ClockOutChangeset {
    pub clock_out: Option<NaiveTime>,
    pub work_minutes: Option<i32>,
    pub is_overtime: bool,
    pub location: WorkLocation,
    pub updated_at: DateTime<Utc>,
}

// --- BreakType Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = break_types)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BreakType {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = break_types)]
pub struct NewBreakType {
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: bool,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = break_types)]
pub struct UpdateBreakTypeChangeset {
    pub name: Option<String>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- BreakSession Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = break_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BreakSession {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub break_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub exceeded: bool,
    pub warning_sent_at: Option<DateTime<Utc>>,
    pub exceeded_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BreakSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = break_sessions)]
pub struct NewBreakSession {
    pub employee_id: Uuid,
    pub break_type: String,
    pub start_time: DateTime<Utc>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = break_sessions)]
pub struct CloseBreakChangeset {
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub exceeded: bool,
    pub updated_at: DateTime<Utc>,
}

// --- TimerSession Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = timer_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimerSession {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub tag: String,
    pub planned_minutes: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TimerStatus,
    pub paused_seconds: i64,
    pub paused_at: Option<DateTime<Utc>>,
    pub actual_seconds: Option<i64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = timer_sessions)]
pub struct NewTimerSession {
    pub employee_id: Uuid,
    pub tag: String,
    pub planned_minutes: i32,
    pub start_time: DateTime<Utc>,
    pub status: TimerStatus,
    pub note: Option<String>,
}

// Full mutable state of a session; written after a domain transition.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = timer_sessions)]
#[diesel(treat_none_as_null = true)]
pub struct TimerStateChangeset {
    pub status: TimerStatus,
    pub paused_seconds: i64,
    pub paused_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub actual_seconds: Option<i64>,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TimerSession> for TimerStateChangeset {
    fn from(timer: &TimerSession) -> Self {
        TimerStateChangeset {
            status: timer.status,
            paused_seconds: timer.paused_seconds,
            paused_at: timer.paused_at,
            end_time: timer.end_time,
            actual_seconds: timer.actual_seconds,
            note: timer.note.clone(),
            updated_at: timer.updated_at,
        }
    }
}

// --- LeaveRequest Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = leave_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub reason: String,
    pub attachment_url: Option<String>,
    pub status: LeaveStatus,
    pub action_by: Option<Uuid>,
    pub action_note: Option<String>,
    pub action_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = leave_requests)]
pub struct NewLeaveRequest {
    pub employee_id: Uuid,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub reason: String,
    pub attachment_url: Option<String>,
    pub status: LeaveStatus,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = leave_requests)]
pub struct UpdateLeaveChangeset {
    pub leave_type: Option<LeaveType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Option<i32>,
    pub reason: Option<String>,
    pub attachment_url: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = leave_requests)]
pub struct LeaveActionChangeset {
    pub status: LeaveStatus,
    pub action_by: Option<Uuid>,
    pub action_note: Option<String>,
    pub action_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// --- DeviceEvent Model ---
#[derive(Insertable, Debug)]
#[diesel(table_name = device_events)]
pub struct NewDeviceEvent {
    pub idempotency_key: String,
    pub employee_id: Uuid,
    pub event_type: DeviceEventType,
    pub camera_id: String,
    pub occurred_at: DateTime<Utc>,
}

// --- PAYLOAD DTOs ---

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct ClockPayload {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize, Debug)]
pub struct DeviceEventPayload {
    pub employee_id: Uuid,
    pub event_type: DeviceEventType,
    pub timestamp: DateTime<Utc>,
    pub camera_id: String,
    pub confidence: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct SetOfficeLocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub address: Option<String>,
    pub radius: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct CreateBreakTypePayload {
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateBreakTypePayload {
    pub name: Option<String>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct StartBreakPayload {
    #[serde(alias = "breakType")]
    pub break_type: String,
}

#[derive(Deserialize, Debug)]
pub struct StartTimerPayload {
    pub tag: String,
    pub duration: i32,
    pub note: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct TimerNotePayload {
    pub note: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateLeavePayload {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub attachment_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateLeavePayload {
    pub leave_type: Option<LeaveType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub reason: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub attachment_url: Option<Option<String>>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeaveDecision {
    Approved,
    Rejected,
}

#[derive(Deserialize, Debug)]
pub struct LeaveActionPayload {
    pub status: LeaveDecision,
    pub action_note: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DashboardQuery {
    pub filter: Option<String>,
}

// --- Pagination DTOs ---
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page", alias = "limit")]
    pub per_page: i64,
}
fn default_page() -> i64 {
    1
}
fn default_per_page() -> i64 {
    8
}

// Keeps `offset()` well inside the range Postgres accepts for OFFSET.
const MAX_PAGE: i64 = i64::MAX / 100;

impl PaginationParams {
    pub fn normalized(self) -> PaginationParams {
        PaginationParams {
            page: self.page.clamp(1, MAX_PAGE),
            per_page: self.per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Query of `GET /breaks/history`. Kept flat because query strings do not
/// mix well with `#[serde(flatten)]`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct BreakHistoryQuery {
    pub page: Option<i64>,
    #[serde(alias = "limit")]
    pub per_page: Option<i64>,
    #[serde(alias = "sortBy")]
    pub sort_by: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub break_type: Option<String>,
    #[serde(alias = "userId")]
    pub user_id: Option<Uuid>,
}

impl BreakHistoryQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page.unwrap_or_else(default_page),
            per_page: self.per_page.unwrap_or_else(default_per_page),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_items: i64,
    pub total_pages: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total_items: i64, params: PaginationParams) -> Self {
        let total_pages = (total_items + params.per_page - 1) / params.per_page;
        PaginatedResponse {
            items,
            total_items,
            total_pages,
            page: params.page,
            per_page: params.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_their_own_column_values() {
        assert_eq!("late".parse::<AttendanceStatus>(), Ok(AttendanceStatus::Late));
        assert_eq!("Annual Leave".parse::<LeaveType>(), Ok(LeaveType::Annual));
        assert_eq!("CLOCK_OUT".parse::<DeviceEventType>(), Ok(DeviceEventType::ClockOut));
        assert!("sleeping".parse::<TimerStatus>().is_err());
    }

    #[test]
    fn leave_type_serializes_with_display_names() {
        let json = serde_json::to_string(&LeaveType::Emergency).unwrap();
        assert_eq!(json, "\"Emergency Leave\"");
        let parsed: LeaveType = serde_json::from_str("\"Sick Leave\"").unwrap();
        assert_eq!(parsed, LeaveType::Sick);
    }

    #[test]
    fn pagination_accepts_limit_alias_and_clamps() {
        let params: PaginationParams = serde_json::from_str(r#"{"page": 0, "limit": 500}"#).unwrap();
        let params = params.normalized();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn pagination_caps_huge_page_numbers() {
        let params: PaginationParams =
            serde_json::from_str(r#"{"page": 9223372036854775807, "per_page": 20}"#).unwrap();
        let params = params.normalized();
        assert_eq!(params.page, MAX_PAGE);
        assert!(params.offset() > 0);
        assert_eq!(params.offset(), (MAX_PAGE - 1) * 20);

        let raw = PaginationParams { page: i64::MAX, per_page: 100 };
        assert_eq!(raw.offset(), i64::MAX);
    }

    #[test]
    fn break_history_query_reads_client_parameter_names() {
        let query: BreakHistoryQuery = serde_json::from_str(
            r#"{"page": 2, "limit": 4, "sortBy": "oldest", "type": "Lunch",
                "userId": "2b7e1516-28ae-4d2a-a6ab-f7158809cf4f"}"#,
        )
        .unwrap();
        assert_eq!(query.sort_by.as_deref(), Some("oldest"));
        assert_eq!(query.break_type.as_deref(), Some("Lunch"));
        assert!(query.user_id.is_some());
        let params = query.pagination();
        assert_eq!((params.page, params.per_page), (2, 4));

        let defaults = BreakHistoryQuery::default().pagination();
        assert_eq!((defaults.page, defaults.per_page), (1, 8));
    }

    #[test]
    fn paginated_response_rounds_total_pages_up() {
        let params = PaginationParams { page: 2, per_page: 8 };
        let response = PaginatedResponse::new(vec![1, 2, 3], 19, params);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.page, 2);
    }

    #[test]
    fn update_leave_payload_distinguishes_null_from_absent() {
        let cleared: UpdateLeavePayload =
            serde_json::from_str(r#"{"attachment_url": null}"#).unwrap();
        assert_eq!(cleared.attachment_url, Some(None));
        let untouched: UpdateLeavePayload = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.attachment_url, None);
    }
}
