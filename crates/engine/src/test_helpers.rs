//! Shared mock collaborators for engine tests.

use async_trait::async_trait;
use canopy_core::error::{GrowStateError, KnowledgeError, NotifyError, ProviderError, StoreError};
use canopy_core::grow::{Grow, GrowStateProvider, Snapshot};
use canopy_core::knowledge::{KnowledgePassage, KnowledgeSearch};
use canopy_core::message::{ConversationSummary, ConversationTurn, Message};
use canopy_core::notify::{Notification, NotificationSink};
use canopy_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use canopy_core::store::{TurnQuery, TurnStore};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A provider that answers from a script.
///
/// Each `complete` call pops the next scripted result; once the script is
/// exhausted the fallback is returned. `stream` sends `fragments` one chunk
/// at a time, or fails with `stream_error` if set.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Result<String, ProviderError>,
    fragments: Vec<String>,
    stream_error: Option<ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn always(text: &str) -> Self {
        Self::sequence(Vec::new(), Ok(text.to_string()))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::sequence(Vec::new(), Err(error))
    }

    pub fn sequence(
        script: Vec<Result<String, ProviderError>>,
        fallback: Result<String, ProviderError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            fragments: Vec::new(),
            stream_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fragments(mut self, fragments: &[&str]) -> Self {
        self.fragments = fragments.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_stream_error(mut self, error: ProviderError) -> Self {
        self.stream_error = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map(|text| make_text_response(&text))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(err) = &self.stream_error {
            return Err(err.clone());
        }
        let (tx, rx) = tokio::sync::mpsc::channel(self.fragments.len() + 1);
        for fragment in &self.fragments {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(fragment.clone()),
                    done: false,
                    usage: None,
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                content: None,
                done: true,
                usage: None,
            }))
            .await;
        Ok(rx)
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A turn store where every operation fails.
pub struct FailingStore;

fn store_down() -> StoreError {
    StoreError::Storage("database unavailable".into())
}

#[async_trait]
impl TurnStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn append_turn(&self, _turn: ConversationTurn) -> Result<String, StoreError> {
        Err(store_down())
    }

    async fn list_turns(
        &self,
        _owner_id: &str,
        _query: TurnQuery,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        Err(store_down())
    }

    async fn count_turns(&self, _owner_id: &str) -> Result<usize, StoreError> {
        Err(store_down())
    }

    async fn delete_turns(&self, _ids: &[String]) -> Result<usize, StoreError> {
        Err(store_down())
    }

    async fn latest_summary(
        &self,
        _owner_id: &str,
    ) -> Result<Option<ConversationSummary>, StoreError> {
        Err(store_down())
    }

    async fn put_summary(&self, _summary: ConversationSummary) -> Result<(), StoreError> {
        Err(store_down())
    }
}

pub struct FailingGrowState;

#[async_trait]
impl GrowStateProvider for FailingGrowState {
    async fn get_grow(
        &self,
        _owner_id: &str,
        _grow_id: Option<&str>,
    ) -> Result<Option<Grow>, GrowStateError> {
        Err(GrowStateError::LookupFailed("grow service offline".into()))
    }

    async fn recent_snapshots(
        &self,
        _grow_id: &str,
        _limit: usize,
    ) -> Result<Vec<Snapshot>, GrowStateError> {
        Err(GrowStateError::LookupFailed("grow service offline".into()))
    }
}

pub struct FailingKnowledge;

#[async_trait]
impl KnowledgeSearch for FailingKnowledge {
    async fn search(
        &self,
        _query: &str,
        _threshold: f32,
        _max_results: usize,
    ) -> Result<Vec<KnowledgePassage>, KnowledgeError> {
        Err(KnowledgeError::SearchFailed("index offline".into()))
    }
}

/// Returns the same passages for every query.
pub struct FixedKnowledge {
    passages: Vec<KnowledgePassage>,
}

impl FixedKnowledge {
    pub fn single(title: &str, content: &str) -> Self {
        Self {
            passages: vec![KnowledgePassage {
                id: title.to_lowercase(),
                title: title.into(),
                content: content.into(),
                similarity: 0.9,
            }],
        }
    }
}

#[async_trait]
impl KnowledgeSearch for FixedKnowledge {
    async fn search(
        &self,
        _query: &str,
        _threshold: f32,
        max_results: usize,
    ) -> Result<Vec<KnowledgePassage>, KnowledgeError> {
        Ok(self.passages.iter().take(max_results).cloned().collect())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl NotificationSink for FailingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::DeliveryFailed {
            owner_id: notification.owner_id,
            reason: "push gateway down".into(),
        })
    }
}
