// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::{
    catalog::{self, ModelCatalogEntry},
    CompletionError, CompletionRequest, ResponseEvent,
};

pub type ResponseStream =
    Pin<Box<dyn Stream<Item = Result<ResponseEvent, CompletionError>> + Send>>;

/// The completion backend as seen by the agent loop.
///
/// One production implementation ([`crate::OpenAiClient`]) plus the mock
/// clients used by tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a streaming chat completion.
    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, CompletionError>;

    /// Non-streaming completion returning the full response text.
    ///
    /// The default implementation drains a streaming call; implementations
    /// with a native non-streaming path should override it.
    async fn complete_text(&self, req: CompletionRequest) -> Result<String, CompletionError> {
        let mut stream = self.complete(req).await?;
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            if let ResponseEvent::TextDelta(delta) = item? {
                out.push_str(&delta);
            }
        }
        Ok(out)
    }

    /// List the models this backend offers.  Defaults to the bundled
    /// static catalog; override to query a live `/models` endpoint.
    async fn list_models(&self) -> Result<Vec<ModelCatalogEntry>, CompletionError> {
        Ok(catalog::static_catalog())
    }
}
