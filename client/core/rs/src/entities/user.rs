use serde::{Deserialize, Serialize};

/// Caller identity, populated by the auth middleware. The core only
/// copies it into session and persistence records; `role` is never
/// interpreted here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthContext {
  pub user_id: String,
  pub username: String,
  pub client_ip: String,
  pub client_user_agent: String,
  #[serde(default)]
  pub role: String,
}
