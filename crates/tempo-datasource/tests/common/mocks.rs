// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of datasource collaborators for testing

use async_trait::async_trait;
use tempo_datasource::oauth::{OAuthToken, OAuthTokenProvider, SignedInUser};

/// Token provider that returns a fixed credential for every user.
pub struct StaticTokenProvider {
    pub token: Option<OAuthToken>,
}

#[async_trait]
impl OAuthTokenProvider for StaticTokenProvider {
    async fn current_oauth_token(&self, _user: &SignedInUser) -> Option<OAuthToken> {
        self.token.clone()
    }
}
