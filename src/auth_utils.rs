// WorkHole/backend-api/src/auth_utils.rs
use crate::error_handler::ServiceError;
use actix_web::{dev::Payload, Error as ActixWebError, FromRequest, HttpRequest};
use futures_util::future::{err, ok, ready, Ready};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Employee,
    Admin,
    /// Service account used by attendance cameras.
    Device,
}

impl Role {
    // Anything the gateway sends other than "admin" or "device" is an ordinary employee.
    fn from_header(value: Option<&str>) -> Role {
        match value.map(str::trim) {
            Some(role) if role.eq_ignore_ascii_case("admin") => Role::Admin,
            Some(role) if role.eq_ignore_ascii_case("device") => Role::Device,
            _ => Role::Employee,
        }
    }
}

/// Identity forwarded by the upstream gateway after it authenticated the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn from_http(req: &HttpRequest) -> Result<Self, ServiceError> {
        let header_value = req.headers().get(USER_ID_HEADER).ok_or_else(|| {
            log::warn!("{} header was NOT found in request headers.", USER_ID_HEADER);
            ServiceError::Unauthorized("Missing X-User-Id header. Authentication required.".to_string())
        })?;

        let user_id_str = header_value.to_str().map_err(|_| {
            log::warn!("{} header is not valid UTF-8.", USER_ID_HEADER);
            ServiceError::bad_request("X-User-Id header contains invalid characters.")
        })?;
        if user_id_str.is_empty() {
            log::warn!("{} header is present but empty.", USER_ID_HEADER);
            return Err(ServiceError::bad_request("X-User-Id header cannot be empty."));
        }

        let id = Uuid::parse_str(user_id_str).map_err(|parse_err| {
            log::warn!(
                "Failed to parse X-User-Id '{}' to UUID: {}",
                user_id_str,
                parse_err
            );
            ServiceError::bad_request("Invalid X-User-Id header format (not a valid UUID).")
        })?;

        let role = Role::from_header(
            req.headers()
                .get(USER_ROLE_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        log::debug!("Authenticated user {} with role {:?}", id, role);
        Ok(AuthenticatedUser { id, role })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixWebError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(AuthenticatedUser::from_http(req).map_err(ActixWebError::from))
    }
}

/// An authenticated user whose gateway role is admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub AuthenticatedUser);

impl AdminUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

impl FromRequest for AdminUser {
    type Error = ActixWebError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match AuthenticatedUser::from_http(req) {
            Ok(user) if user.is_admin() => ok(AdminUser(user)),
            Ok(user) => {
                log::warn!("User {} attempted an admin-only operation.", user.id);
                err(ServiceError::Forbidden("Admin role required.".to_string()).into())
            }
            Err(e) => err(e.into()),
        }
    }
}

/// A caller allowed to report clock events on behalf of any employee: a
/// device service account or an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClient(pub AuthenticatedUser);

impl DeviceClient {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

impl FromRequest for DeviceClient {
    type Error = ActixWebError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match AuthenticatedUser::from_http(req) {
            Ok(user) if matches!(user.role, Role::Device | Role::Admin) => ok(DeviceClient(user)),
            Ok(user) => {
                log::warn!("User {} attempted to post a device event.", user.id);
                err(ServiceError::Forbidden("Device or admin role required.".to_string()).into())
            }
            Err(e) => err(e.into()),
        }
    }
}
