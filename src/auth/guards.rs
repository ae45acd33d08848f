use std::net::{IpAddr, Ipv4Addr};

use rocket::State;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::roles::Role;
use crate::auth::{AuthError, AuthState};

/// Any authenticated caller. The stricter tier guards wrap this one.
///
/// The role comes straight out of the verified token, a snapshot taken at
/// issuance. Guards never consult the database, so a role change (or even
/// account deletion) leaves outstanding tokens working until they expire.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub utorid: String,
    pub role: Role,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        gate(request, Role::Regular).await
    }
}

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireCashier(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireCashier {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        gate(request, Role::Cashier).await.map(RequireCashier)
    }
}

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireManager(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireManager {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        gate(request, Role::Manager).await.map(RequireManager)
    }
}

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireSuperuser(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireSuperuser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        gate(request, Role::Superuser).await.map(RequireSuperuser)
    }
}

/// Shared admission check: 401 for anything wrong with the token itself,
/// 403 once the caller is known but under-privileged.
async fn gate(request: &Request<'_>, minimum: Role) -> Outcome<AuthUser, AuthError> {
    let state = match request.guard::<&State<AuthState>>().await.succeeded() {
        Some(state) => state,
        None => {
            let err = AuthError::Config("AuthState missing from managed state".into());
            return Outcome::Error((err.status(), err));
        }
    };

    let token = match bearer_token(request) {
        Some(token) => token,
        None => return Outcome::Error((Status::Unauthorized, AuthError::Unauthorized)),
    };

    let identity = match state.jwt_service.verify(token) {
        Some(identity) => identity,
        None => return Outcome::Error((Status::Unauthorized, AuthError::Unauthorized)),
    };

    // A claim outside the enumerated roles never clears any bar.
    let role = match Role::from_str(&identity.role) {
        Some(role) => role,
        None => return Outcome::Error((Status::Forbidden, AuthError::Forbidden)),
    };

    if !role.is_at_least(minimum) {
        return Outcome::Error((Status::Forbidden, AuthError::Forbidden));
    }

    Outcome::Success(AuthUser {
        utorid: identity.utorid,
        role,
    })
}

fn bearer_token<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    let header = request.headers().get_one("Authorization")?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Requester address for the reset-request rate window. Falls back to
/// loopback when the transport exposes no peer address (local test clients).
#[derive(Debug, Clone, Copy, OpenApiFromRequest)]
pub struct RequesterIp(pub IpAddr);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequesterIp {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let addr = request
            .client_ip()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Outcome::Success(RequesterIp(addr))
    }
}
