//! Read-only derivations behind the dashboard and stats endpoints. Every
//! function here takes rows already loaded by a service and returns a
//! serializable view; nothing is written back.

use crate::domain::time_utils::{
    format_clock, hours_one_decimal, minutes_of, minutes_to_clock_12h, minutes_to_duration,
    weekday_short,
};
use crate::models::{
    AttendanceDay, AttendanceStatus, BreakSession, Employee, LeaveRequest, PaginatedResponse,
    PaginationParams, WorkLocation,
};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown dashboard filter '{0}', expected 'week' or 'month'")]
pub struct UnknownFilter(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DashboardWindow {
    #[default]
    Week,
    Month,
}

impl DashboardWindow {
    pub fn from_filter(filter: Option<&str>) -> Result<Self, UnknownFilter> {
        match filter.map(str::trim) {
            None | Some("") | Some("week") => Ok(DashboardWindow::Week),
            Some("month") => Ok(DashboardWindow::Month),
            Some(other) => Err(UnknownFilter(other.to_string())),
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            DashboardWindow::Week => 7,
            DashboardWindow::Month => 30,
        }
    }

    /// First date of the trailing window that ends on `today`.
    pub fn first_day(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.days() - 1)
    }
}

/// The trailing overtime window is fixed regardless of the dashboard filter.
pub const OVERTIME_WINDOW_DAYS: i64 = 30;

pub fn overtime_window_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(OVERTIME_WINDOW_DAYS - 1)
}

pub struct AttendanceInputs<'a> {
    pub today: NaiveDate,
    pub shift_hours: i32,
    pub today_row: Option<&'a AttendanceDay>,
    /// Rows from `overtime_window_start(today)` through today, oldest first.
    pub recent_days: &'a [AttendanceDay],
    /// Closed breaks started on the local `today`.
    pub today_breaks: &'a [BreakSession],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductiveDay {
    pub day: String,
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub day: &'static str,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceDashboard {
    pub daily_shift: String,
    pub this_period: String,
    pub this_period_minutes: i64,
    pub breaks_taken: String,
    pub breaks_count: usize,
    pub total_overtime: String,
    pub current_status: &'static str,
    pub active_work_time: String,
    pub today_progress: String,
    pub efficiency: i64,
    pub completed_shift: i64,
    pub remaining_time: String,
    pub most_productive_day: Option<ProductiveDay>,
    pub work_hours_chart: Vec<ChartPoint>,
}

fn closed_minutes(day: &AttendanceDay) -> Option<i64> {
    if day.clock_out.is_some() {
        day.work_minutes.map(i64::from)
    } else {
        None
    }
}

fn percent_of(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).min(100.0).round() as i64
}

pub fn attendance_dashboard(window: DashboardWindow, inputs: &AttendanceInputs) -> AttendanceDashboard {
    let shift_minutes = i64::from(inputs.shift_hours) * 60;
    let window_start = window.first_day(inputs.today);
    let overtime_start = overtime_window_start(inputs.today);

    let in_window: Vec<&AttendanceDay> = inputs
        .recent_days
        .iter()
        .filter(|d| d.work_date >= window_start && d.work_date <= inputs.today)
        .filter(|d| closed_minutes(d).is_some())
        .collect();
    let period_minutes: i64 = in_window.iter().filter_map(|d| closed_minutes(d)).sum();

    let total_overtime: i64 = inputs
        .recent_days
        .iter()
        .filter(|d| d.work_date >= overtime_start && d.is_overtime)
        .filter_map(closed_minutes)
        .map(|minutes| (minutes - shift_minutes).max(0))
        .sum();

    let today_work = inputs
        .today_row
        .and_then(|d| d.work_minutes)
        .map(i64::from)
        .unwrap_or(0);
    let today_breaks: i64 = inputs
        .today_breaks
        .iter()
        .filter_map(|b| b.duration_minutes)
        .map(i64::from)
        .sum();
    let active_work = (today_work - today_breaks).max(0);

    let clocked_in = inputs
        .today_row
        .map(|d| d.clock_in.is_some() && d.clock_out.is_none())
        .unwrap_or(false);

    let mut most_productive: Option<&AttendanceDay> = None;
    for day in in_window.iter().copied() {
        let minutes = closed_minutes(day).unwrap_or(0);
        if minutes > most_productive.and_then(closed_minutes).unwrap_or(0) {
            most_productive = Some(day);
        }
    }

    let work_hours_chart = (0..window.days())
        .map(|offset| {
            let date = window_start + Duration::days(offset);
            let minutes = in_window
                .iter()
                .find(|d| d.work_date == date)
                .and_then(|d| closed_minutes(d))
                .unwrap_or(0);
            ChartPoint {
                date,
                day: weekday_short(date),
                hours: hours_one_decimal(minutes),
            }
        })
        .collect();

    AttendanceDashboard {
        daily_shift: minutes_to_duration(today_work),
        this_period: minutes_to_duration(period_minutes),
        this_period_minutes: period_minutes,
        breaks_taken: minutes_to_duration(today_breaks),
        breaks_count: inputs.today_breaks.len(),
        total_overtime: minutes_to_duration(total_overtime),
        current_status: if clocked_in { "Clocked In" } else { "Clocked Out" },
        active_work_time: minutes_to_duration(active_work),
        today_progress: format!("{} / {}h", minutes_to_duration(today_work), inputs.shift_hours),
        efficiency: percent_of(active_work, shift_minutes),
        completed_shift: percent_of(today_work, shift_minutes),
        remaining_time: minutes_to_duration((shift_minutes - today_work).max(0)),
        most_productive_day: most_productive.map(|d| ProductiveDay {
            day: d.day_name.clone(),
            date: d.work_date,
            time: minutes_to_duration(closed_minutes(d).unwrap_or(0)),
        }),
        work_hours_chart,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceLogEntry {
    pub date: NaiveDate,
    pub day: String,
    pub check_in_time: String,
    pub check_out_time: String,
    pub work_hours: String,
    pub status: AttendanceStatus,
    pub location: WorkLocation,
}

impl From<&AttendanceDay> for AttendanceLogEntry {
    fn from(day: &AttendanceDay) -> Self {
        AttendanceLogEntry {
            date: day.work_date,
            day: day.day_name.clone(),
            check_in_time: clock_or_na(day.clock_in),
            check_out_time: clock_or_na(day.clock_out),
            work_hours: minutes_to_duration(day.work_minutes.map(i64::from).unwrap_or(0)),
            status: day.status,
            location: day.location,
        }
    }
}

fn clock_or_na(time: Option<chrono::NaiveTime>) -> String {
    time.map(format_clock).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub total_days_present: i64,
    pub total_days_absent: i64,
    pub late_arrivals: i64,
    pub avg_clock_in: String,
    pub attendance_logs: PaginatedResponse<AttendanceLogEntry>,
}

/// Mean of minutes-since-midnight over the days that have a clock-in.
pub fn average_clock_in(days: &[AttendanceDay]) -> String {
    let clock_ins: Vec<i32> = days.iter().filter_map(|d| d.clock_in).map(minutes_of).collect();
    if clock_ins.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    let mean = clock_ins.iter().map(|m| f64::from(*m)).sum::<f64>() / clock_ins.len() as f64;
    minutes_to_clock_12h(mean)
}

/// Counts cover the whole month; `page` is the requested slice of it.
pub fn attendance_stats(
    month: &[AttendanceDay],
    page: &[AttendanceDay],
    params: PaginationParams,
) -> AttendanceStats {
    let count = |pred: fn(&AttendanceStatus) -> bool| month.iter().filter(|d| pred(&d.status)).count() as i64;
    AttendanceStats {
        total_days_present: count(|s| matches!(s, AttendanceStatus::Present | AttendanceStatus::Late)),
        total_days_absent: count(|s| matches!(s, AttendanceStatus::Absent)),
        late_arrivals: count(|s| matches!(s, AttendanceStatus::Late)),
        avg_clock_in: average_clock_in(month),
        attendance_logs: PaginatedResponse::new(
            page.iter().map(AttendanceLogEntry::from).collect(),
            month.len() as i64,
            params,
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&Employee> for EmployeeSummary {
    fn from(employee: &Employee) -> Self {
        EmployeeSummary {
            id: employee.id,
            first_name: employee.first_name.clone(),
            last_name: employee.last_name.clone(),
            email: employee.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamAttendanceEntry {
    pub employee: EmployeeSummary,
    #[serde(flatten)]
    pub log: AttendanceLogEntry,
}

pub fn team_attendance(rows: &[(AttendanceDay, Employee)]) -> Vec<TeamAttendanceEntry> {
    rows.iter()
        .map(|(day, employee)| TeamAttendanceEntry {
            employee: EmployeeSummary::from(employee),
            log: AttendanceLogEntry::from(day),
        })
        .collect()
}

// --- Home dashboard ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatChartDay {
    pub date: NaiveDate,
    pub work_hours: f64,
    pub is_current_month: bool,
    pub day_of_month: u32,
    /// 0 = Sunday.
    pub day_of_week: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatChartWeek {
    pub week_number: u32,
    pub days: Vec<HeatChartDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyHeatChart {
    pub month: u32,
    pub year: i32,
    pub weeks: Vec<HeatChartWeek>,
}

/// Full weeks covering the month of `anchor`, each starting on `week_start`.
/// Days outside the month are included (flagged) so every week has 7 cells.
pub fn weekly_heat_chart(anchor: NaiveDate, week_start: Weekday, days: &[AttendanceDay]) -> WeeklyHeatChart {
    let first = anchor.with_day(1).unwrap_or(anchor);
    let lead = (first.weekday().num_days_from_sunday() + 7 - week_start.num_days_from_sunday()) % 7;
    let mut cursor = first - Duration::days(i64::from(lead));

    let mut weeks = Vec::new();
    let mut week_number = 1;
    loop {
        let week_days = (0..7)
            .map(|i| {
                let date = cursor + Duration::days(i);
                let minutes = days
                    .iter()
                    .find(|d| d.work_date == date)
                    .and_then(closed_minutes)
                    .unwrap_or(0);
                HeatChartDay {
                    date,
                    work_hours: hours_one_decimal(minutes),
                    is_current_month: date.month() == first.month() && date.year() == first.year(),
                    day_of_month: date.day(),
                    day_of_week: date.weekday().num_days_from_sunday(),
                }
            })
            .collect();
        weeks.push(HeatChartWeek { week_number, days: week_days });
        cursor = cursor + Duration::days(7);
        week_number += 1;
        if cursor.month() != first.month() || cursor.year() != first.year() {
            break;
        }
    }

    WeeklyHeatChart {
        month: first.month(),
        year: first.year(),
        weeks,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeDashboard {
    pub current_status: &'static str,
    pub leave_status: String,
    pub daily_shift: String,
    pub clock_in: Option<String>,
    pub heat_chart: WeeklyHeatChart,
    pub current_month: u32,
    pub current_year: i32,
}

pub fn home_dashboard(
    today: NaiveDate,
    week_start: Weekday,
    today_row: Option<&AttendanceDay>,
    latest_leave: Option<&LeaveRequest>,
    month_days: &[AttendanceDay],
) -> HomeDashboard {
    let current_status = match today_row.map(|d| (d.clock_in.is_some(), d.clock_out.is_some())) {
        Some((true, false)) => "Clocked In",
        Some((true, true)) => "Clocked Out",
        _ => "Not clocked in",
    };
    let heat_chart = weekly_heat_chart(today, week_start, month_days);

    HomeDashboard {
        current_status,
        leave_status: latest_leave
            .map(|l| l.status.to_string())
            .unwrap_or_else(|| "No requests".to_string()),
        daily_shift: minutes_to_duration(
            today_row.and_then(|d| d.work_minutes).map(i64::from).unwrap_or(0),
        ),
        clock_in: today_row.and_then(|d| d.clock_in).map(format_clock),
        current_month: heat_chart.month,
        current_year: heat_chart.year,
        heat_chart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attendance::fixtures::day;
    use crate::domain::breaks::fixtures::closed_session;
    use crate::domain::leave::fixtures::request;
    use crate::models::{LeaveStatus, LeaveType};
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn closed(d: u32, clock_in: &str, clock_out: &str) -> AttendanceDay {
        day(date(d), Some(clock_in), Some(clock_out))
    }

    fn week_of_rows() -> Vec<AttendanceDay> {
        vec![
            closed(4, "09:00", "17:30"),
            closed(5, "09:00", "18:05"),
            closed(6, "09:30", "18:05"),
            day(date(7), Some("08:55"), None),
        ]
    }

    #[test]
    fn filter_parsing() {
        assert_eq!(DashboardWindow::from_filter(None), Ok(DashboardWindow::Week));
        assert_eq!(DashboardWindow::from_filter(Some("month")), Ok(DashboardWindow::Month));
        assert!(DashboardWindow::from_filter(Some("year")).is_err());
    }

    #[test]
    fn dashboard_sums_closed_days_and_overtime() {
        let rows = week_of_rows();
        let breaks = vec![closed_session(
            "Coffee",
            Utc.with_ymd_and_hms(2024, 3, 7, 10, 0, 0).unwrap(),
            22,
            true,
        )];
        let inputs = AttendanceInputs {
            today: date(7),
            shift_hours: 8,
            today_row: rows.last(),
            recent_days: &rows,
            today_breaks: &breaks,
        };
        let view = attendance_dashboard(DashboardWindow::Week, &inputs);

        // 510 + 545 + 515
        assert_eq!(view.this_period_minutes, 1570);
        assert_eq!(view.this_period, "26h 10m");
        // (510 - 480) + (545 - 480) + (515 - 480)
        assert_eq!(view.total_overtime, "2h 10m");
        assert_eq!(view.current_status, "Clocked In");
        assert_eq!(view.breaks_taken, "22m");
        assert_eq!(view.breaks_count, 1);
        assert_eq!(view.daily_shift, "0h 0m");
        assert_eq!(view.remaining_time, "8h");
        assert_eq!(view.efficiency, 0);
        assert_eq!(view.today_progress, "0h 0m / 8h");

        let best = view.most_productive_day.unwrap();
        assert_eq!(best.date, date(5));
        assert_eq!(best.time, "9h 5m");

        assert_eq!(view.work_hours_chart.len(), 7);
        assert_eq!(view.work_hours_chart[0].date, date(1));
        assert_eq!(view.work_hours_chart[3].hours, 8.5);
        assert_eq!(view.work_hours_chart[6].hours, 0.0);
    }

    #[test]
    fn most_productive_day_keeps_the_first_of_a_tie() {
        let rows = vec![closed(4, "09:00", "17:00"), closed(5, "09:00", "17:00")];
        let inputs = AttendanceInputs {
            today: date(5),
            shift_hours: 8,
            today_row: rows.last(),
            recent_days: &rows,
            today_breaks: &[],
        };
        let view = attendance_dashboard(DashboardWindow::Week, &inputs);
        assert_eq!(view.most_productive_day.unwrap().date, date(4));
        assert_eq!(view.efficiency, 100);
        assert_eq!(view.current_status, "Clocked Out");
    }

    #[test]
    fn empty_history_has_no_productive_day() {
        let inputs = AttendanceInputs {
            today: date(5),
            shift_hours: 8,
            today_row: None,
            recent_days: &[],
            today_breaks: &[],
        };
        let view = attendance_dashboard(DashboardWindow::Month, &inputs);
        assert_eq!(view.most_productive_day, None);
        assert_eq!(view.work_hours_chart.len(), 30);
        assert_eq!(view.current_status, "Clocked Out");
    }

    #[test]
    fn aggregation_is_idempotent() {
        let rows = week_of_rows();
        let inputs = AttendanceInputs {
            today: date(7),
            shift_hours: 8,
            today_row: rows.last(),
            recent_days: &rows,
            today_breaks: &[],
        };
        let first = attendance_dashboard(DashboardWindow::Week, &inputs);
        let second = attendance_dashboard(DashboardWindow::Week, &inputs);
        assert_eq!(first, second);

        let params = PaginationParams { page: 1, per_page: 8 };
        assert_eq!(attendance_stats(&rows, &rows, params), attendance_stats(&rows, &rows, params));
        assert_eq!(rows, week_of_rows());
    }

    #[test]
    fn stats_count_statuses_and_average_clock_in() {
        let mut rows = week_of_rows();
        rows[2].status = AttendanceStatus::Late;
        rows.push({
            let mut absent = day(date(8), None, None);
            absent.status = AttendanceStatus::Absent;
            absent
        });
        let params = PaginationParams { page: 1, per_page: 2 };
        let stats = attendance_stats(&rows, &rows[..2], params);

        assert_eq!(stats.total_days_present, 4);
        assert_eq!(stats.total_days_absent, 1);
        assert_eq!(stats.late_arrivals, 1);
        // (540 + 540 + 570 + 535) / 4 = 546.25
        assert_eq!(stats.avg_clock_in, "9:06 AM");
        assert_eq!(stats.attendance_logs.total_items, 5);
        assert_eq!(stats.attendance_logs.total_pages, 3);
        assert_eq!(stats.attendance_logs.items[0].check_in_time, "09:00");
    }

    #[test]
    fn average_clock_in_without_data_is_na() {
        assert_eq!(average_clock_in(&[]), NOT_AVAILABLE);
        let open = day(date(8), None, None);
        let log = AttendanceLogEntry::from(&open);
        assert_eq!(log.check_out_time, NOT_AVAILABLE);
        assert_eq!(log.work_hours, "0h 0m");
    }

    #[test]
    fn heat_chart_pads_full_weeks_from_the_configured_start() {
        // March 2024 starts on a Friday and has 31 days.
        let rows = week_of_rows();
        let chart = weekly_heat_chart(date(15), Weekday::Sun, &rows);
        assert_eq!((chart.month, chart.year), (3, 2024));
        assert_eq!(chart.weeks.len(), 6);
        let first_week = &chart.weeks[0];
        assert_eq!(first_week.days[0].date, NaiveDate::from_ymd_opt(2024, 2, 25).unwrap());
        assert!(!first_week.days[0].is_current_month);
        assert_eq!(first_week.days[5].day_of_month, 1);
        assert_eq!(first_week.days[5].day_of_week, 5);

        let monday_start = weekly_heat_chart(date(15), Weekday::Mon, &rows);
        assert_eq!(monday_start.weeks.len(), 5);
        assert_eq!(monday_start.weeks[0].days[0].date, NaiveDate::from_ymd_opt(2024, 2, 26).unwrap());
        // The open day on the 7th contributes nothing.
        let week_two = &monday_start.weeks[1].days;
        assert_eq!(week_two[0].work_hours, 8.5);
        assert_eq!(week_two[3].work_hours, 0.0);
    }

    #[test]
    fn home_dashboard_reports_status_and_latest_leave() {
        let rows = week_of_rows();
        let leave = request(LeaveType::Sick, LeaveStatus::Approved, 1);
        let view = home_dashboard(date(7), Weekday::Sun, rows.last(), Some(&leave), &rows);
        assert_eq!(view.current_status, "Clocked In");
        assert_eq!(view.leave_status, "approved");
        assert_eq!(view.clock_in.as_deref(), Some("08:55"));
        assert_eq!(view.current_month, 3);

        let empty = home_dashboard(date(7), Weekday::Sun, None, None, &[]);
        assert_eq!(empty.current_status, "Not clocked in");
        assert_eq!(empty.leave_status, "No requests");
        assert_eq!(empty.daily_shift, "0h 0m");
    }
}
