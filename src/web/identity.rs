//! Bearer token identities

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ApiUser;

/// Authenticated user name, attached to the request when a known token is presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

#[derive(Debug, Default)]
pub struct TokenTable {
    tokens: HashMap<String, String>,
}

impl TokenTable {
    pub fn from_users(users: &[ApiUser]) -> Self {
        Self {
            tokens: users
                .iter()
                .map(|u| (u.token.clone(), u.name.clone()))
                .collect(),
        }
    }

    pub fn identify(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

/// Attach an [`Identity`] for `Authorization: Bearer <token>`. Unknown or missing
/// tokens leave the request anonymous.
pub async fn authenticate(
    State(tokens): State<Arc<TokenTable>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| tokens.identify(token.trim()))
        .map(|name| Identity(name.to_string()));

    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }

    next.run(request).await
}
