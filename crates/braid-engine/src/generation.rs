use std::sync::{Arc, Mutex};

use braid_core::config::BraidConfig;
use braid_core::{BranchId, ConversationId, MessageId, UserId};
use braid_context::ContextStrategy;
use braid_protocol::{ContentBlock, EventKind, ServerFrame};
use braid_providers::{
    select_profile, ChatHints, ChatMessage, ChatRequest, GenerationOutcome, InferenceDriver,
};
use braid_rooms::ConversationSlot;
use braid_tree::{ConversationModel, RenderedMessage, Role};
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::Result;

/// Everything `generate` needs beyond what it already reads from the cached
/// tree — the pieces that live outside the branch tree proper (config, the
/// chosen model, who is paying).
pub struct GenerationRequest<'a> {
    pub user_id: UserId,
    pub model_id: &'a str,
    pub user_group: Option<&'a str>,
    pub max_tokens: u32,
    /// Set by `continue_message`: content already on the branch being
    /// written into. The final fill is this content followed by whatever
    /// the stream produces, rather than a bare replacement — what makes
    /// `continue` distinct from `regenerate`'s fresh empty branch.
    pub continuation_seed: Option<Vec<ContentBlock>>,
}

fn to_chat_message(rendered: &RenderedMessage) -> ChatMessage {
    let role = match &rendered.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    ChatMessage {
        role: role.to_string(),
        content_blocks: rendered.content_blocks.clone(),
    }
}

impl Engine {
    /// Runs one streamed generation into `branch_id` (already created empty
    /// by `regenerate`/`edit_message`, or freshly created for a reply to
    /// `message_id`'s parent). Builds the prompt from the active path via
    /// `context_strategy`, selects a provider profile (§4.7), drives the
    /// stream (§4.6) broadcasting `ai_generating`/`stream`/`ai_finished`
    /// frames, then durably fills the branch with whatever content was
    /// produced and burns a grant for token usage. A mid-stream provider
    /// error also broadcasts an `error` frame carrying the `UpstreamKind`'s
    /// message/suggestion pair, and records usage against a best-effort
    /// input-token estimate rather than the provider's (unreported) count.
    pub async fn generate(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
        branch_id: &BranchId,
        context_strategy: &mut ContextStrategy,
        config: &BraidConfig,
        req: GenerationRequest<'_>,
        cancel: CancellationToken,
    ) -> Result<GenerationOutcome> {
        let (system_prompt, rendered) = {
            let guard = model.lock().unwrap();
            (
                guard.conversation.system_prompt.clone(),
                guard.tree.walk_active_path(branch_id),
            )
        };
        let new_message: Option<RenderedMessage> = None;
        let estimated_input_tokens = braid_context::estimate_total_tokens(&rendered);
        let (prepared, _meta) = context_strategy.prepare(system_prompt, &rendered, new_message.as_ref());
        let continuation_seed = req.continuation_seed.clone();

        let profiles = config.all_profiles();
        let strategy = config.load_balancing.strategy;
        let group_key = req
            .model_id
            .split('/')
            .next()
            .unwrap_or(req.model_id)
            .to_string();
        let profile = select_profile(
            &profiles,
            req.model_id,
            req.user_group,
            strategy,
            &self.selector,
            &group_key,
        )
        .map_err(braid_core::BraidError::from)?;
        let provider = self.provider_for(&profile.id)?;

        let chat_request = ChatRequest {
            model: req.model_id.to_string(),
            system_prompt: prepared.system_prompt,
            messages: prepared.messages.iter().map(to_chat_message).collect(),
            max_tokens: req.max_tokens,
            hints: ChatHints {
                cache_anchor_index: prepared.provider_hints.cache_anchor_index,
                stop_sequences: prepared.provider_hints.stop_sequences,
            },
        };

        self.rooms.broadcast(
            conversation_id,
            &ServerFrame::AiGenerating {
                message_id: message_id.to_string(),
                user_id: req.user_id.to_string(),
            },
            None,
        );

        let slot = Arc::new(ConversationSlot::new(
            self.rooms.clone(),
            conversation_id.clone(),
            message_id.clone(),
        ));
        let driver = InferenceDriver::new(provider, slot);

        let message_id_str = message_id.to_string();
        let branch_id_str = branch_id.to_string();
        let rooms = self.rooms.clone();
        let conversation_id_for_chunks = conversation_id.clone();
        let outcome = driver
            .run(&chat_request, cancel, move |chunk, is_complete, content_blocks| {
                rooms.broadcast(
                    &conversation_id_for_chunks,
                    &ServerFrame::Stream {
                        message_id: message_id_str.clone(),
                        branch_id: branch_id_str.clone(),
                        chunk: chunk.to_string(),
                        is_complete,
                        content_blocks: content_blocks.map(|b| b.to_vec()),
                    },
                    None,
                );
            })
            .await
            .map_err(braid_core::BraidError::from)?;

        self.rooms.broadcast(
            conversation_id,
            &ServerFrame::AiFinished {
                message_id: message_id.to_string(),
            },
            None,
        );

        if let Some(kind) = outcome.failed {
            let (message, suggestion) = kind.message_and_suggestion();
            self.rooms.broadcast(
                conversation_id,
                &ServerFrame::Error {
                    code: braid_core::BraidError::upstream(kind, message).code().to_string(),
                    message: message.to_string(),
                    suggestion: Some(suggestion.to_string()),
                },
                None,
            );
        }

        if !outcome.content_blocks.is_empty() || outcome.cancelled || outcome.failed.is_some() {
            let final_content = match continuation_seed {
                Some(mut seed) => {
                    seed.extend(outcome.content_blocks.clone());
                    seed
                }
                None => outcome.content_blocks.clone(),
            };
            let fill_event = EventKind::MessageBranchUpdated {
                message_id: message_id.to_string(),
                branch_id: branch_id.to_string(),
                content_blocks: final_content.clone(),
                thought_signature: outcome.thought_signature.clone(),
                debug_request_blob_id: None,
                debug_response_blob_id: None,
                debug_request: None,
                debug_response: None,
            };
            self.apply_tree_events(conversation_id, model, vec![fill_event])?;
            self.rooms.broadcast(
                conversation_id,
                &ServerFrame::MessageEdited {
                    message_id: message_id.to_string(),
                    branch_id: branch_id.to_string(),
                    content_blocks: final_content,
                },
                None,
            );
        }

        self.record_usage(
            conversation_id,
            &req.user_id,
            message_id,
            branch_id,
            &outcome,
            &profile.id,
            estimated_input_tokens,
        )?;

        Ok(outcome)
    }

    /// Emits `metrics_added` to the owner's user log and burns a grant for
    /// the tokens spent (§4.5/§4.8 interplay: generation consumes balance).
    /// A mid-stream failure usually means the provider never reported real
    /// usage (`tokens_in == 0`) — `estimated_input_tokens`, the token
    /// estimator's count over the prompt actually sent, stands in so usage
    /// is still recorded on the failure path (§4.6 point 4).
    fn record_usage(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        message_id: &MessageId,
        branch_id: &BranchId,
        outcome: &GenerationOutcome,
        provider_profile_id: &str,
        estimated_input_tokens: u64,
    ) -> Result<()> {
        let tokens_in = if outcome.tokens_in > 0 {
            outcome.tokens_in
        } else {
            estimated_input_tokens
        };
        let metrics = EventKind::MetricsAdded {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            branch_id: branch_id.to_string(),
            tokens_in,
            tokens_out: outcome.tokens_out,
            cost: None,
            currency: None,
            provider_profile_id: Some(provider_profile_id.to_string()),
        };
        self.append(metrics, Some(user_id), None)?;

        if outcome.tokens_out > 0 {
            let grant_event = self.grants.record_grant(
                braid_grants::GrantType::Burn,
                outcome.tokens_out as i64,
                None,
                Some(user_id.clone()),
                None,
                Some("generation".to_string()),
                None,
            );
            self.append(grant_event, None, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use braid_core::config::ProviderProfile;
    use braid_providers::ChatResponse;
    use tempfile::tempdir;

    struct FakeProvider;

    #[async_trait]
    impl braid_providers::LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, _req: &ChatRequest) -> braid_providers::Result<ChatResponse> {
            Ok(ChatResponse {
                content_blocks: ContentBlock::from_legacy_content("hello from fake"),
                model: "fake-model".to_string(),
                tokens_in: 10,
                tokens_out: 5,
                stop_reason: "end_turn".to_string(),
                thought_signature: None,
            })
        }
    }

    fn config_with_one_profile() -> BraidConfig {
        let mut config = BraidConfig::default();
        config.providers.insert(
            "anthropic".to_string(),
            vec![ProviderProfile {
                id: "test-profile".to_string(),
                base_url: None,
                api_key: None,
                priority: 1,
                allowed_models: None,
                model_costs: None,
                allowed_user_groups: None,
            }],
        );
        config
    }

    #[tokio::test]
    async fn generate_fills_branch_and_burns_a_grant_for_tokens_spent() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(dir.path()).unwrap();
        let owner = UserId::new();
        let conversation_id = engine.create_conversation(owner.clone(), "t".to_string()).unwrap();
        let model = engine.open_conversation(&owner, &conversation_id).unwrap();

        let (message_id, _first_branch) = engine
            .send_chat(
                &conversation_id,
                &model,
                Role::User,
                ContentBlock::from_legacy_content("hi"),
                None,
                None,
            )
            .unwrap();
        let branch_id = engine.regenerate(&conversation_id, &model, &message_id, None).unwrap();

        let config = config_with_one_profile();
        engine.register_provider("test-profile", Arc::new(FakeProvider));
        let mut strategy = ContextStrategy::Append;

        let outcome = engine
            .generate(
                &conversation_id,
                &model,
                &message_id,
                &branch_id,
                &mut strategy,
                &config,
                GenerationRequest {
                    user_id: owner.clone(),
                    model_id: "fake-model",
                    user_group: None,
                    max_tokens: 100,
                    continuation_seed: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.tokens_out, 5);
        {
            let guard = model.lock().unwrap();
            assert_eq!(guard.tree.branch(&branch_id).unwrap().plain_text(), "hello from fake");
        }
        assert_eq!(engine.grants.balance(&owner, "credit"), -5);
    }

    #[tokio::test]
    async fn continue_message_appends_to_existing_content_instead_of_replacing_it() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(dir.path()).unwrap();
        let owner = UserId::new();
        let conversation_id = engine.create_conversation(owner.clone(), "t".to_string()).unwrap();
        let model = engine.open_conversation(&owner, &conversation_id).unwrap();

        let (message_id, first_branch) = engine
            .send_chat(&conversation_id, &model, Role::Assistant, ContentBlock::from_legacy_content("the answer is"), None, None)
            .unwrap();

        let (branch_id, existing_content) = engine.continue_message(&model, &message_id).unwrap();
        assert_eq!(branch_id, first_branch);

        let config = config_with_one_profile();
        engine.register_provider("test-profile", Arc::new(FakeProvider));
        let mut strategy = ContextStrategy::Append;

        engine
            .generate(
                &conversation_id,
                &model,
                &message_id,
                &branch_id,
                &mut strategy,
                &config,
                GenerationRequest {
                    user_id: owner,
                    model_id: "fake-model",
                    user_group: None,
                    max_tokens: 100,
                    continuation_seed: Some(existing_content),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let guard = model.lock().unwrap();
        assert_eq!(
            guard.tree.branch(&branch_id).unwrap().plain_text(),
            "the answer is\nhello from fake"
        );
    }

    #[tokio::test]
    async fn generate_fails_with_not_eligible_when_no_provider_profile_is_configured() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(dir.path()).unwrap();
        let owner = UserId::new();
        let conversation_id = engine.create_conversation(owner.clone(), "t".to_string()).unwrap();
        let model = engine.open_conversation(&owner, &conversation_id).unwrap();
        let (message_id, _) = engine
            .send_chat(&conversation_id, &model, Role::User, ContentBlock::from_legacy_content("hi"), None, None)
            .unwrap();
        let branch_id = engine.regenerate(&conversation_id, &model, &message_id, None).unwrap();

        let config = BraidConfig::default();
        let mut strategy = ContextStrategy::Append;

        let err = engine
            .generate(
                &conversation_id,
                &model,
                &message_id,
                &branch_id,
                &mut strategy,
                &config,
                GenerationRequest {
                    user_id: owner,
                    model_id: "fake-model",
                    user_group: None,
                    max_tokens: 100,
                    continuation_seed: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Braid(braid_core::BraidError::NotEligible(_))));
    }
}
