//! Rules for the daily attendance record: lateness, overtime and the
//! clock-in / clock-out preconditions. Persistence lives in
//! `services::attendance_service`; everything here is pure so the same
//! rules back the HTTP path and the device-event path.

use crate::domain::geofence::GeofenceVerdict;
use crate::domain::time_utils::{minutes_of, parse_clock, truncate_to_minute, weekday_name};
use crate::models::{AttendanceDay, AttendanceStatus, Employee, WorkLocation};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use thiserror::Error;

pub const DEFAULT_SHIFT_HOURS: i32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttendanceError {
    #[error("Already clocked in today")]
    AlreadyClockedIn,
    #[error("Must clock in first")]
    NotClockedIn,
    #[error("Already clocked out today")]
    AlreadyClockedOut,
    #[error("clock-out {clock_out} precedes clock-in {clock_in}")]
    NegativeWorkTime {
        clock_in: NaiveTime,
        clock_out: NaiveTime,
    },
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::AlreadyClockedIn => "ALREADY_CLOCKED_IN",
            AttendanceError::NotClockedIn => "NOT_CLOCKED_IN",
            AttendanceError::AlreadyClockedOut => "ALREADY_CLOCKED_OUT",
            AttendanceError::NegativeWorkTime { .. } => "NEGATIVE_WORK_TIME",
        }
    }
}

pub fn default_shift_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// An employee's shift as the engines see it, with directory gaps filled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftPolicy {
    pub start: NaiveTime,
    pub hours: i32,
    pub offset: FixedOffset,
}

impl ShiftPolicy {
    pub fn for_employee(employee: &Employee, default_offset_minutes: i32) -> Self {
        let start = match employee.shift_start_local.as_deref() {
            Some(raw) => parse_clock(raw).unwrap_or_else(|e| {
                log::warn!(
                    "Employee {} has a malformed shift start ({}), using 09:00",
                    employee.id,
                    e
                );
                default_shift_start()
            }),
            None => default_shift_start(),
        };
        let hours = employee
            .shift_hours
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_SHIFT_HOURS);
        let offset_minutes = employee.utc_offset_minutes.unwrap_or(default_offset_minutes);

        ShiftPolicy {
            start,
            hours,
            offset: offset_from_minutes(offset_minutes),
        }
    }

    pub fn shift_minutes(&self) -> i32 {
        self.hours * 60
    }

    pub fn local_clock(&self, now: DateTime<Utc>) -> LocalClock {
        LocalClock::at(now, self.offset)
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// UTC instant of local midnight starting `date`.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        (local_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    /// Half-open UTC range `[start, end)` covering the local `date`.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.day_start(date);
        (start, start + Duration::days(1))
    }
}

impl Default for ShiftPolicy {
    fn default() -> Self {
        ShiftPolicy {
            start: default_shift_start(),
            hours: DEFAULT_SHIFT_HOURS,
            offset: offset_from_minutes(0),
        }
    }
}

pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Local calendar date and minute-precision time of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl LocalClock {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        LocalClock {
            date: local.date_naive(),
            time: truncate_to_minute(local.time()),
        }
    }

    pub fn day_name(&self) -> &'static str {
        weekday_name(self.date)
    }
}

/// Zero-padded "HH:mm" strings compare like the times they encode, so this
/// is the same rule as a lexical comparison of the clock strings.
pub fn arrival_status(clock_in: NaiveTime, shift_start: NaiveTime) -> AttendanceStatus {
    if truncate_to_minute(clock_in) > truncate_to_minute(shift_start) {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

pub fn work_minutes(clock_in: NaiveTime, clock_out: NaiveTime) -> Result<i32, AttendanceError> {
    let minutes = minutes_of(clock_out) - minutes_of(clock_in);
    if minutes < 0 {
        return Err(AttendanceError::NegativeWorkTime {
            clock_in,
            clock_out,
        });
    }
    Ok(minutes)
}

pub fn is_overtime(work_minutes: i32, policy: &ShiftPolicy) -> bool {
    work_minutes > policy.shift_minutes()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockInPlan {
    pub work_date: NaiveDate,
    pub day_name: String,
    pub clock_in: NaiveTime,
    pub status: AttendanceStatus,
    pub location: WorkLocation,
    pub warning: Option<String>,
}

pub fn plan_clock_in(
    existing: Option<&AttendanceDay>,
    policy: &ShiftPolicy,
    now: DateTime<Utc>,
    verdict: GeofenceVerdict,
) -> Result<ClockInPlan, AttendanceError> {
    let clock = policy.local_clock(now);
    if existing.is_some_and(|day| day.clock_in.is_some()) {
        return Err(AttendanceError::AlreadyClockedIn);
    }

    Ok(ClockInPlan {
        work_date: clock.date,
        day_name: clock.day_name().to_string(),
        clock_in: clock.time,
        status: arrival_status(clock.time, policy.start),
        location: verdict.location,
        warning: verdict.warning,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockOutPlan {
    pub clock_out: NaiveTime,
    pub work_minutes: i32,
    pub is_overtime: bool,
    pub location: WorkLocation,
    pub warning: Option<String>,
}

pub fn plan_clock_out(
    existing: Option<&AttendanceDay>,
    policy: &ShiftPolicy,
    now: DateTime<Utc>,
    verdict: GeofenceVerdict,
) -> Result<ClockOutPlan, AttendanceError> {
    let day = existing.ok_or(AttendanceError::NotClockedIn)?;
    let clock_in = day.clock_in.ok_or(AttendanceError::NotClockedIn)?;
    if day.clock_out.is_some() {
        return Err(AttendanceError::AlreadyClockedOut);
    }

    let clock_out = policy.local_clock(now).time;
    let minutes = work_minutes(clock_in, clock_out)?;

    Ok(ClockOutPlan {
        clock_out,
        work_minutes: minutes,
        is_overtime: is_overtime(minutes, policy),
        location: verdict.location,
        warning: verdict.warning,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn office() -> GeofenceVerdict {
        GeofenceVerdict {
            location: WorkLocation::Office,
            warning: None,
            distance_meters: Some(0.0),
        }
    }

    fn remote() -> GeofenceVerdict {
        GeofenceVerdict {
            location: WorkLocation::Home,
            warning: Some("not at office location".to_string()),
            distance_meters: Some(200.0),
        }
    }

    fn policy() -> ShiftPolicy {
        ShiftPolicy::for_employee(&employee(), 0)
    }

    fn march_4() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn one_minute_after_shift_start_is_late() {
        let plan = plan_clock_in(None, &policy(), at(9, 1, 0), office()).unwrap();
        assert_eq!(plan.status, AttendanceStatus::Late);
        assert_eq!(plan.clock_in, clock("09:01"));
    }

    #[test]
    fn one_minute_before_shift_start_is_present() {
        let plan = plan_clock_in(None, &policy(), at(8, 59, 0), office()).unwrap();
        assert_eq!(plan.status, AttendanceStatus::Present);
    }

    #[test]
    fn seconds_past_shift_start_do_not_count_as_late() {
        let plan = plan_clock_in(None, &policy(), at(9, 0, 45), office()).unwrap();
        assert_eq!(plan.status, AttendanceStatus::Present);
    }

    #[test]
    fn clock_in_records_day_name_location_and_warning() {
        let plan = plan_clock_in(None, &policy(), at(8, 30, 0), remote()).unwrap();
        assert_eq!(plan.work_date, march_4());
        assert_eq!(plan.day_name, "Monday");
        assert_eq!(plan.location, WorkLocation::Home);
        assert_eq!(plan.warning.as_deref(), Some("not at office location"));
    }

    #[test]
    fn second_clock_in_is_rejected() {
        let existing = day(march_4(), Some("08:30"), None);
        let err = plan_clock_in(Some(&existing), &policy(), at(9, 30, 0), office()).unwrap_err();
        assert_eq!(err, AttendanceError::AlreadyClockedIn);
    }

    #[test]
    fn placeholder_row_without_clock_in_accepts_clock_in() {
        let existing = day(march_4(), None, None);
        assert!(plan_clock_in(Some(&existing), &policy(), at(9, 30, 0), office()).is_ok());
    }

    #[test]
    fn local_date_follows_employee_offset() {
        let mut emp = employee();
        emp.utc_offset_minutes = Some(120);
        let policy = ShiftPolicy::for_employee(&emp, 0);
        // 23:30 UTC on the 4th is 01:30 on the 5th in UTC+2.
        let plan = plan_clock_in(None, &policy, at(23, 30, 0), office()).unwrap();
        assert_eq!(plan.work_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(plan.clock_in, clock("01:30"));
    }

    #[test]
    fn eight_and_a_half_hours_is_not_overtime_on_nine_to_five() {
        let existing = day(march_4(), Some("09:00"), None);
        let plan = plan_clock_out(Some(&existing), &policy(), at(17, 30, 0), office()).unwrap();
        assert_eq!(plan.work_minutes, 510);
        assert!(!plan.is_overtime);
    }

    #[test]
    fn leaving_at_1805_is_overtime() {
        let existing = day(march_4(), Some("09:00"), None);
        let plan = plan_clock_out(Some(&existing), &policy(), at(18, 5, 0), office()).unwrap();
        assert_eq!(plan.work_minutes, 545);
        assert!(plan.is_overtime);
    }

    #[test]
    fn overtime_uses_employee_shift_length() {
        let mut emp = employee();
        emp.shift_hours = Some(9);
        let policy = ShiftPolicy::for_employee(&emp, 0);
        let existing = day(march_4(), Some("09:00"), None);
        let plan = plan_clock_out(Some(&existing), &policy, at(18, 5, 0), office()).unwrap();
        assert!(!plan.is_overtime);
    }

    #[test]
    fn clock_out_without_clock_in_is_rejected() {
        let err = plan_clock_out(None, &policy(), at(17, 0, 0), office()).unwrap_err();
        assert_eq!(err, AttendanceError::NotClockedIn);

        let placeholder = day(march_4(), None, None);
        let err = plan_clock_out(Some(&placeholder), &policy(), at(17, 0, 0), office()).unwrap_err();
        assert_eq!(err, AttendanceError::NotClockedIn);
    }

    #[test]
    fn second_clock_out_is_rejected() {
        let existing = day(march_4(), Some("09:00"), Some("17:00"));
        let err = plan_clock_out(Some(&existing), &policy(), at(18, 0, 0), office()).unwrap_err();
        assert_eq!(err, AttendanceError::AlreadyClockedOut);
    }

    #[test]
    fn clock_out_location_is_classified_independently() {
        let existing = day(march_4(), Some("09:00"), None);
        let plan = plan_clock_out(Some(&existing), &policy(), at(17, 0, 0), remote()).unwrap();
        assert_eq!(plan.location, WorkLocation::Home);
        assert!(plan.warning.is_some());
    }

    #[test]
    fn negative_work_time_is_a_data_integrity_error() {
        let err = work_minutes(clock("10:00"), clock("09:00")).unwrap_err();
        assert_eq!(err.code(), "NEGATIVE_WORK_TIME");
    }

    #[test]
    fn missing_directory_fields_fall_back_to_defaults() {
        let mut emp = employee();
        emp.shift_hours = None;
        emp.shift_start_local = Some("nine".to_string());
        emp.utc_offset_minutes = None;
        let policy = ShiftPolicy::for_employee(&emp, 60);
        assert_eq!(policy.start, clock("09:00"));
        assert_eq!(policy.shift_minutes(), 480);
        assert_eq!(policy.offset.local_minus_utc(), 3600);
    }

    #[test]
    fn day_bounds_cover_the_local_day() {
        let mut emp = employee();
        emp.utc_offset_minutes = Some(120);
        let policy = ShiftPolicy::for_employee(&emp, 0);
        let (start, end) = policy.day_bounds(march_4());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 3, 22, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(policy.today(start), march_4());
    }
}
