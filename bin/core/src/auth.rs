use anyhow::anyhow;
use axum::{
  extract::Request, http::HeaderMap, http::StatusCode,
  middleware::Next, response::Response,
};
use ferry_client::entities::user::AuthContext;
use serror::AddStatusCode;

/// Header carrying the authenticated user id, set by the auth
/// gateway in front of the core.
const USER_ID_HEADER: &str = "x-ferry-user-id";
const USER_NAME_HEADER: &str = "x-ferry-user-name";
const ROLE_HEADER: &str = "x-ferry-role";

/// Builds the [AuthContext] for the request and makes it available
/// as an extension. Requests without a user identity are rejected.
pub async fn auth_request(
  mut req: Request,
  next: Next,
) -> serror::Result<Response> {
  let ctx = auth_context(req.headers())
    .status_code(StatusCode::UNAUTHORIZED)?;
  req.extensions_mut().insert(ctx);
  Ok(next.run(req).await)
}

fn auth_context(headers: &HeaderMap) -> anyhow::Result<AuthContext> {
  let user_id = header_str(headers, USER_ID_HEADER);
  if user_id.is_empty() {
    return Err(anyhow!(
      "request not authenticated | missing {USER_ID_HEADER} header"
    ));
  }
  let username = {
    let username = header_str(headers, USER_NAME_HEADER);
    if username.is_empty() {
      user_id.clone()
    } else {
      username
    }
  };
  Ok(AuthContext {
    user_id,
    username,
    client_ip: client_ip(headers),
    client_user_agent: header_str(headers, "user-agent"),
    role: header_str(headers, ROLE_HEADER),
  })
}

fn client_ip(headers: &HeaderMap) -> String {
  let forwarded = header_str(headers, "x-forwarded-for");
  if let Some(first) = forwarded.split(',').next()
    && !first.trim().is_empty()
  {
    return first.trim().to_string();
  }
  let real_ip = header_str(headers, "x-real-ip");
  if !real_ip.is_empty() {
    return real_ip;
  }
  String::from("unknown")
}

fn header_str(headers: &HeaderMap, key: &str) -> String {
  headers
    .get(key)
    .and_then(|value| value.to_str().ok())
    .unwrap_or_default()
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_missing_user_id() {
    let headers = HeaderMap::new();
    assert!(auth_context(&headers).is_err());
  }

  #[test]
  fn username_falls_back_to_user_id() {
    let mut headers = HeaderMap::new();
    headers.insert(USER_ID_HEADER, "u-1".parse().unwrap());
    let ctx = auth_context(&headers).unwrap();
    assert_eq!(ctx.user_id, "u-1");
    assert_eq!(ctx.username, "u-1");
    assert_eq!(ctx.client_ip, "unknown");
  }

  #[test]
  fn client_ip_prefers_first_forwarded_hop() {
    let mut headers = HeaderMap::new();
    headers.insert(USER_ID_HEADER, "u-1".parse().unwrap());
    headers.insert(
      "x-forwarded-for",
      "10.0.0.7, 172.16.0.1".parse().unwrap(),
    );
    let ctx = auth_context(&headers).unwrap();
    assert_eq!(ctx.client_ip, "10.0.0.7");
  }
}
