//! Caller identity from trusted gateway headers.
//!
//! Sessions are terminated in front of this service; it only reads the
//! identity the gateway forwards.

use axum::http::HeaderMap;

use crate::classroom::{Actor, Role};
use crate::error::{ClassroomError, Result};

pub const ACTOR_ID: &str = "x-actor-id";
pub const ACTOR_NAME: &str = "x-actor-name";
pub const ACTOR_AVATAR: &str = "x-actor-avatar";
pub const ACTOR_ROLE: &str = "x-actor-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Extract the acting user from request headers
pub fn extract_actor(headers: &HeaderMap) -> Result<Actor> {
    let id = header(headers, ACTOR_ID)
        .ok_or_else(|| ClassroomError::denied("no caller identity"))?
        .parse::<i32>()
        .map_err(|_| ClassroomError::denied("malformed caller identity"))?;

    let role = match header(headers, ACTOR_ROLE) {
        Some(raw) => raw
            .to_ascii_lowercase()
            .parse::<Role>()
            .map_err(|_| ClassroomError::denied(format!("unknown role '{}'", raw)))?,
        None => Role::Member,
    };

    let name = header(headers, ACTOR_NAME).unwrap_or("Unknown").to_string();
    let actor = Actor::new(id, name, role);
    Ok(match header(headers, ACTOR_AVATAR) {
        Some(avatar) => actor.with_avatar(avatar),
        None => actor,
    })
}
