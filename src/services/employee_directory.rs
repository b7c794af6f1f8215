// WorkHole/backend-api/src/services/employee_directory.rs
use crate::domain::attendance::ShiftPolicy;
use crate::error_handler::ServiceError;
use crate::models::Employee;
use crate::schema::employees;
use crate::services::Settings;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn find_employee(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Employee, ServiceError> {
    employees::table
        .find(employee_id)
        .select(Employee::as_select())
        .first::<Employee>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Employee with id {} not found", employee_id)))
}

/// Loads the employee with a row lock held until the surrounding
/// transaction ends. Leave writes take it so balance checks run one at a time
/// per employee.
pub async fn lock_employee(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Employee, ServiceError> {
    employees::table
        .find(employee_id)
        .select(Employee::as_select())
        .for_update()
        .get_result::<Employee>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Employee with id {} not found", employee_id)))
}

/// The employee together with their shift rules, defaults filled in.
pub async fn employee_with_policy(
    conn: &mut AsyncPgConnection,
    settings: &Settings,
    employee_id: Uuid,
) -> Result<(Employee, ShiftPolicy), ServiceError> {
    let employee = find_employee(conn, employee_id).await?;
    let policy = ShiftPolicy::for_employee(&employee, settings.default_utc_offset_minutes);
    Ok((employee, policy))
}

pub fn annual_entitlement(employee: &Employee, settings: &Settings) -> i32 {
    employee
        .annual_leave_entitlement
        .unwrap_or(settings.annual_leave_entitlement)
}
