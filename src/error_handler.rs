// WorkHole/backend-api/src/error_handler.rs
use crate::domain::attendance::AttendanceError;
use crate::domain::breaks::BreakError;
use crate::domain::leave::LeaveError;
use crate::domain::reporting::UnknownFilter;
use crate::domain::timer::TimerError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::bb8::RunError as BB8RunError;
use diesel_async::pooled_connection::PoolError;
use serde_json::json;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum ServiceError {
    InternalServerError(String),
    BadRequest { code: &'static str, message: String },
    Unauthorized(String),
    Forbidden(String),
    DatabaseError(String), // Message already user-safe
    NotFound(String),
    PoolError(String), // Message already user-safe
    /// The operation collides with existing state (a second open session, a processed request).
    Conflict { code: &'static str, message: String },
    /// The operation is not valid in the current state (clock-out before clock-in).
    PreconditionFailed { code: &'static str, message: String },
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> ServiceError {
        ServiceError::BadRequest {
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InternalServerError(_) => "INTERNAL_ERROR",
            ServiceError::BadRequest { code, .. } => *code,
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::DatabaseError(_) => "DATABASE_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::PoolError(_) => "POOL_ERROR",
            ServiceError::Conflict { code, .. } => *code,
            ServiceError::PreconditionFailed { code, .. } => *code,
        }
    }

    fn from_diesel_error(error: DieselError) -> ServiceError {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                log::warn!("Unique constraint violated: {}", info.message());
                ServiceError::Conflict {
                    code: "DUPLICATE",
                    message: "The record already exists.".to_string(),
                }
            }
            DieselError::DatabaseError(kind, info) => {
                let detailed_message =
                    format!("Database error: {:?} - Info: {}", kind, info.message());
                log::error!("Internal Database Error: {}", detailed_message);
                ServiceError::DatabaseError("A database operation failed.".to_string())
            }
            DieselError::NotFound => {
                ServiceError::NotFound("The requested record was not found.".to_string())
            }
            err => {
                log::error!("Unexpected Diesel error: {}", err);
                ServiceError::DatabaseError("An unexpected database error occurred.".to_string())
            }
        }
    }

    fn from_pool_error(error: PoolError) -> ServiceError {
        log::error!("Pool error: {:?}", error);
        ServiceError::PoolError("Could not connect to the database pool.".to_string())
    }

    fn from_bb8_run_error(error: BB8RunError) -> ServiceError {
        log::error!("BB8 connection pool error: {:?}", error);
        ServiceError::PoolError("Could not obtain connection from database pool.".to_string())
    }
}

/// True when `error` is the unique/partial-unique index guarding an open
/// session, so callers can report the domain conflict instead.
pub fn is_unique_violation(error: &DieselError) -> bool {
    matches!(
        error,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

impl From<DieselError> for ServiceError {
    fn from(error: DieselError) -> ServiceError {
        ServiceError::from_diesel_error(error)
    }
}

impl From<PoolError> for ServiceError {
    fn from(error: PoolError) -> ServiceError {
        ServiceError::from_pool_error(error)
    }
}

impl From<BB8RunError> for ServiceError {
    fn from(error: BB8RunError) -> ServiceError {
        ServiceError::from_bb8_run_error(error)
    }
}

impl From<AttendanceError> for ServiceError {
    fn from(error: AttendanceError) -> ServiceError {
        let code = error.code();
        match error {
            AttendanceError::AlreadyClockedIn | AttendanceError::AlreadyClockedOut => {
                ServiceError::Conflict {
                    code,
                    message: error.to_string(),
                }
            }
            AttendanceError::NotClockedIn => ServiceError::PreconditionFailed {
                code,
                message: error.to_string(),
            },
            AttendanceError::NegativeWorkTime { .. } => {
                log::error!("Attendance data integrity error: {}", error);
                ServiceError::InternalServerError(error.to_string())
            }
        }
    }
}

impl From<BreakError> for ServiceError {
    fn from(error: BreakError) -> ServiceError {
        let code = error.code();
        let message = error.to_string();
        match error {
            BreakError::UnknownBreakType(_) => ServiceError::NotFound(message),
            BreakError::BreakAlreadyActive => ServiceError::Conflict { code, message },
            BreakError::NoOpenBreak => ServiceError::PreconditionFailed { code, message },
            BreakError::InvalidAllotment | BreakError::InvalidFilter(_) => {
                ServiceError::BadRequest { code, message }
            }
        }
    }
}

impl From<TimerError> for ServiceError {
    fn from(error: TimerError) -> ServiceError {
        let code = error.code();
        let message = error.to_string();
        match error {
            TimerError::AlreadyActive => ServiceError::Conflict { code, message },
            TimerError::NotRunning | TimerError::NotPaused | TimerError::AlreadyFinished => {
                ServiceError::PreconditionFailed { code, message }
            }
            TimerError::InvalidDuration(_) | TimerError::EmptyTag => {
                ServiceError::BadRequest { code, message }
            }
        }
    }
}

impl From<LeaveError> for ServiceError {
    fn from(error: LeaveError) -> ServiceError {
        let code = error.code();
        let message = error.to_string();
        match error {
            LeaveError::InvalidDateRange { .. } | LeaveError::EmptyReason => {
                ServiceError::BadRequest { code, message }
            }
            LeaveError::NotPending | LeaveError::InsufficientBalance { .. } => {
                ServiceError::PreconditionFailed { code, message }
            }
            LeaveError::AlreadyProcessed(_) => ServiceError::Conflict { code, message },
        }
    }
}

impl From<UnknownFilter> for ServiceError {
    fn from(error: UnknownFilter) -> ServiceError {
        ServiceError::BadRequest {
            code: "INVALID_FILTER",
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ServiceError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
            ServiceError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ServiceError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ServiceError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            ServiceError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ServiceError::PoolError(msg) => write!(f, "Pool Error: {}", msg),
            ServiceError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
            ServiceError::PreconditionFailed { message, .. } => {
                write!(f, "Precondition Failed: {}", message)
            }
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match *self {
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::PoolError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::PreconditionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        // Server-side details were logged where the error was built; only a
        // generic message leaves the process.
        let user_facing_message = match status_code.as_u16() < 500 {
            true => self.to_string(),
            false => "An internal server error occurred. Please try again later.".to_string(),
        };

        if status_code.is_server_error() {
            log::error!(
                "Responding with server error ({}): {}",
                status_code,
                self
            );
        } else {
            log::warn!(
                "Responding with client error ({}): {}",
                status_code,
                user_facing_message
            );
        }

        HttpResponse::build(status_code).json(json!({
            "status": "error",
            "statusCode": status_code.as_u16(),
            "code": self.code(),
            "message": user_facing_message
        }))
    }
}
