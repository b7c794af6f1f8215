use crate::models::{LeaveDecision, LeaveRequest, LeaveStatus, LeaveType, UpdateLeavePayload};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_ANNUAL_ENTITLEMENT: i32 = 21;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaveError {
    #[error("End date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("Reason cannot be empty")]
    EmptyReason,
    #[error("Only pending leave requests can be changed")]
    NotPending,
    #[error("Leave request has already been {0}")]
    AlreadyProcessed(LeaveStatus),
    #[error("Insufficient annual leave balance: requested {requested} days, {available} available")]
    InsufficientBalance { requested: i32, available: i32 },
}

impl LeaveError {
    pub fn code(&self) -> &'static str {
        match self {
            LeaveError::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            LeaveError::EmptyReason => "INVALID_REASON",
            LeaveError::NotPending => "LEAVE_NOT_PENDING",
            LeaveError::AlreadyProcessed(_) => "LEAVE_ALREADY_PROCESSED",
            LeaveError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        }
    }
}

/// Both ends count: Jan 1 to Jan 3 is three days.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> Result<i32, LeaveError> {
    if end < start {
        return Err(LeaveError::InvalidDateRange { start, end });
    }
    Ok((end - start).num_days() as i32 + 1)
}

pub fn validate_reason(reason: &str) -> Result<String, LeaveError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LeaveError::EmptyReason);
    }
    Ok(reason.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaveBalance {
    pub entitlement: i32,
    pub used_annual_days: i32,
    pub available: i32,
}

impl LeaveBalance {
    /// Only approved annual leave draws on the entitlement.
    pub fn from_requests(entitlement: i32, requests: &[LeaveRequest]) -> Self {
        let used_annual_days = requests
            .iter()
            .filter(|r| r.leave_type == LeaveType::Annual && r.status == LeaveStatus::Approved)
            .map(|r| r.days)
            .sum();
        LeaveBalance {
            entitlement,
            used_annual_days,
            available: (entitlement - used_annual_days).max(0),
        }
    }

    pub fn check(&self, leave_type: LeaveType, days: i32) -> Result<(), LeaveError> {
        if leave_type == LeaveType::Annual && days > self.available {
            return Err(LeaveError::InsufficientBalance {
                requested: days,
                available: self.available,
            });
        }
        Ok(())
    }
}

pub fn ensure_editable(request: &LeaveRequest) -> Result<(), LeaveError> {
    match request.status {
        LeaveStatus::Pending => Ok(()),
        LeaveStatus::Approved | LeaveStatus::Rejected => Err(LeaveError::NotPending),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveEdit {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub reason: String,
    pub attachment_url: Option<String>,
}

/// Merges a partial update into a pending request and recounts the days.
pub fn plan_update(
    request: &LeaveRequest,
    payload: &UpdateLeavePayload,
    balance: &LeaveBalance,
) -> Result<LeaveEdit, LeaveError> {
    ensure_editable(request)?;
    let leave_type = payload.leave_type.unwrap_or(request.leave_type);
    let start_date = payload.start_date.unwrap_or(request.start_date);
    let end_date = payload.end_date.unwrap_or(request.end_date);
    let days = inclusive_days(start_date, end_date)?;
    let reason = match payload.reason.as_deref() {
        Some(reason) => validate_reason(reason)?,
        None => request.reason.clone(),
    };
    balance.check(leave_type, days)?;

    Ok(LeaveEdit {
        leave_type,
        start_date,
        end_date,
        days,
        reason,
        attachment_url: payload
            .attachment_url
            .clone()
            .unwrap_or_else(|| request.attachment_url.clone()),
    })
}

/// Approval of annual leave re-checks the balance at decision time.
pub fn decide(
    request: &LeaveRequest,
    decision: LeaveDecision,
    balance: &LeaveBalance,
) -> Result<LeaveStatus, LeaveError> {
    if request.status != LeaveStatus::Pending {
        return Err(LeaveError::AlreadyProcessed(request.status));
    }
    match decision {
        LeaveDecision::Approved => {
            balance.check(request.leave_type, request.days)?;
            Ok(LeaveStatus::Approved)
        }
        LeaveDecision::Rejected => Ok(LeaveStatus::Rejected),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LeaveTypeCounts {
    pub annual_leaves: i64,
    pub sick_leaves: i64,
    pub emergency_leaves: i64,
    pub unpaid_leaves: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LeaveStatusCounts {
    pub pending_leaves: i64,
    pub approved_leaves: i64,
    pub rejected_leaves: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaveStats {
    pub leave_type_counts: LeaveTypeCounts,
    pub status_counts: LeaveStatusCounts,
    pub available_leaves: i32,
    pub total_annual_leaves: i32,
    pub used_annual_days: i32,
}

pub fn stats(entitlement: i32, requests: &[LeaveRequest]) -> LeaveStats {
    let mut types = LeaveTypeCounts::default();
    let mut statuses = LeaveStatusCounts::default();
    for request in requests {
        match request.leave_type {
            LeaveType::Annual => types.annual_leaves += 1,
            LeaveType::Sick => types.sick_leaves += 1,
            LeaveType::Emergency => types.emergency_leaves += 1,
            LeaveType::Unpaid => types.unpaid_leaves += 1,
        }
        match request.status {
            LeaveStatus::Pending => statuses.pending_leaves += 1,
            LeaveStatus::Approved => statuses.approved_leaves += 1,
            LeaveStatus::Rejected => statuses.rejected_leaves += 1,
        }
    }
    let balance = LeaveBalance::from_requests(entitlement, requests);
    LeaveStats {
        leave_type_counts: types,
        status_counts: statuses,
        available_leaves: balance.available,
        total_annual_leaves: entitlement,
        used_annual_days: balance.used_annual_days,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn day_count_includes_both_ends() {
        assert_eq!(inclusive_days(date(2024, 1, 1), date(2024, 1, 3)), Ok(3));
        assert_eq!(inclusive_days(date(2024, 1, 1), date(2024, 1, 1)), Ok(1));
        assert_eq!(inclusive_days(date(2024, 2, 28), date(2024, 3, 1)), Ok(3));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = inclusive_days(date(2024, 1, 3), date(2024, 1, 1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE_RANGE");
    }

    #[test]
    fn balance_counts_only_approved_annual_days() {
        let requests = vec![
            request(LeaveType::Annual, LeaveStatus::Approved, 5),
            request(LeaveType::Annual, LeaveStatus::Pending, 3),
            request(LeaveType::Sick, LeaveStatus::Approved, 2),
            request(LeaveType::Annual, LeaveStatus::Rejected, 4),
        ];
        let balance = LeaveBalance::from_requests(21, &requests);
        assert_eq!(balance.used_annual_days, 5);
        assert_eq!(balance.available, 16);
    }

    #[test]
    fn balance_never_goes_negative() {
        let requests = vec![request(LeaveType::Annual, LeaveStatus::Approved, 30)];
        assert_eq!(LeaveBalance::from_requests(21, &requests).available, 0);
    }

    #[test]
    fn annual_leave_beyond_balance_is_rejected() {
        let balance = LeaveBalance::from_requests(3, &[]);
        assert!(balance.check(LeaveType::Annual, 3).is_ok());
        assert_eq!(
            balance.check(LeaveType::Annual, 4),
            Err(LeaveError::InsufficientBalance { requested: 4, available: 3 })
        );
        assert!(balance.check(LeaveType::Unpaid, 40).is_ok());
    }

    #[test]
    fn decisions_apply_to_pending_requests_only() {
        let balance = LeaveBalance::from_requests(21, &[]);
        let pending = request(LeaveType::Annual, LeaveStatus::Pending, 2);
        assert_eq!(decide(&pending, LeaveDecision::Approved, &balance), Ok(LeaveStatus::Approved));
        assert_eq!(decide(&pending, LeaveDecision::Rejected, &balance), Ok(LeaveStatus::Rejected));

        let approved = request(LeaveType::Annual, LeaveStatus::Approved, 2);
        assert_eq!(
            decide(&approved, LeaveDecision::Rejected, &balance),
            Err(LeaveError::AlreadyProcessed(LeaveStatus::Approved))
        );
    }

    #[test]
    fn approval_rechecks_balance() {
        let used = vec![request(LeaveType::Annual, LeaveStatus::Approved, 20)];
        let balance = LeaveBalance::from_requests(21, &used);
        let pending = request(LeaveType::Annual, LeaveStatus::Pending, 2);
        let err = decide(&pending, LeaveDecision::Approved, &balance).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        // Rejecting is always possible.
        assert!(decide(&pending, LeaveDecision::Rejected, &balance).is_ok());
    }

    #[test]
    fn update_recounts_days_and_keeps_untouched_fields() {
        let balance = LeaveBalance::from_requests(21, &[]);
        let mut existing = request(LeaveType::Sick, LeaveStatus::Pending, 1);
        existing.attachment_url = Some("https://files.example/note.pdf".into());
        let payload = UpdateLeavePayload {
            leave_type: None,
            start_date: None,
            end_date: Some(date(2024, 1, 5)),
            reason: None,
            attachment_url: None,
        };
        let edit = plan_update(&existing, &payload, &balance).unwrap();
        assert_eq!(edit.days, 5);
        assert_eq!(edit.reason, "Family trip");
        assert_eq!(edit.attachment_url, existing.attachment_url);
    }

    #[test]
    fn update_can_clear_the_attachment() {
        let balance = LeaveBalance::from_requests(21, &[]);
        let mut existing = request(LeaveType::Sick, LeaveStatus::Pending, 1);
        existing.attachment_url = Some("https://files.example/note.pdf".into());
        let payload = UpdateLeavePayload {
            leave_type: None,
            start_date: None,
            end_date: None,
            reason: None,
            attachment_url: Some(None),
        };
        assert_eq!(plan_update(&existing, &payload, &balance).unwrap().attachment_url, None);
    }

    #[test]
    fn processed_requests_cannot_be_updated() {
        let balance = LeaveBalance::from_requests(21, &[]);
        let approved = request(LeaveType::Sick, LeaveStatus::Approved, 1);
        let payload = UpdateLeavePayload {
            leave_type: None,
            start_date: None,
            end_date: None,
            reason: Some("changed".into()),
            attachment_url: None,
        };
        assert_eq!(plan_update(&approved, &payload, &balance), Err(LeaveError::NotPending));
    }

    #[test]
    fn stats_count_by_type_and_status() {
        let requests = vec![
            request(LeaveType::Annual, LeaveStatus::Approved, 5),
            request(LeaveType::Sick, LeaveStatus::Pending, 1),
            request(LeaveType::Sick, LeaveStatus::Rejected, 2),
        ];
        let summary = stats(21, &requests);
        assert_eq!(summary.leave_type_counts.sick_leaves, 2);
        assert_eq!(summary.leave_type_counts.annual_leaves, 1);
        assert_eq!(summary.status_counts.pending_leaves, 1);
        assert_eq!(summary.available_leaves, 16);
        assert_eq!(summary.total_annual_leaves, 21);
    }
}
