// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OAuth pass-through collaborator types.
//!
//! Token acquisition itself lives in the host application; this module only
//! defines the seam the executor calls through, plus the snapshot of the
//! inbound web request that the web layer parks in the request registry.

use async_trait::async_trait;

/// The authenticated principal of the inbound web request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignedInUser {
    pub user_id: i64,
    pub org_id: i64,
    pub login: String,
}

/// Snapshot of the inbound web request's auth state, stored in the request
/// registry for the duration of the request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub signed_in_user: SignedInUser,
}

/// A delegated OAuth credential for the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthToken {
    /// Token type as issued (e.g. `Bearer`).
    pub token_type: String,
    pub access_token: String,
}

impl OAuthToken {
    /// Formats the credential as an `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Resolves the current OAuth credential for a signed-in user.
///
/// Returns `None` when no OAuth integration is configured for the user;
/// the executor then sends the request without an `Authorization` header.
#[async_trait]
pub trait OAuthTokenProvider: Send + Sync {
    async fn current_oauth_token(&self, user: &SignedInUser) -> Option<OAuthToken>;
}

#[cfg(test)]
mod tests {
    use super::OAuthToken;

    #[test]
    fn authorization_header_combines_type_and_token() {
        let token = OAuthToken {
            token_type: "Bearer".to_string(),
            access_token: "abc.def.ghi".to_string(),
        };
        assert_eq!(token.authorization_header(), "Bearer abc.def.ghi");
    }
}
