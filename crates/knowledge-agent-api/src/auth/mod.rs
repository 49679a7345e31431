pub mod middleware;

pub use middleware::require_user;

/// Identity attached to every request by the auth middleware. The gateway
/// in front of this service validated the token; we only read its claims
/// and carry the raw delegated credential for downstream probes.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub bearer_token: String,
}
