//! Topic Aliasing Layer
//!
//! Extensions can expose a recorded topic under additional names. This
//! layer sits between a player and its consumers and applies a declarative
//! alias map in both directions:
//!
//! - **downstream** ([`AliasingStateProcessor::process`]): duplicate
//!   aliased topics in the frame's messages, the preload blocks, the topic
//!   list (duplicates carry `aliased_from_name`), and the endpoint maps
//! - **upstream** ([`AliasingStateProcessor::alias_subscriptions`]): map
//!   alias names in subscriptions back to the real topics before they
//!   reach the wrapped player, de-duplicating aliases of one real topic
//!
//! ## Referential Stability
//!
//! Consumers skip work when a slice of player state is the same object as
//! last frame, so the processor must not rebuild output for input that
//! didn't change. Memoization is keyed on the explicit revision counters
//! of `ActiveData` and on per-slot [`BlockId`]s — content generations, not
//! pointer identity (see the note in `state`). Unchanged input slice ⇒ the
//! previously returned `Arc`, and untouched per-topic slices inside a
//! block keep the input's own `Arc`.
//!
//! ## Conflicts
//!
//! Two alias sources claiming the same alias for different topics, or an
//! alias colliding with a real topic, would silently shadow data. Both are
//! rejected: the offending alias is dropped and a player alert says so.
//!
//! ## Re-derivation
//!
//! [`AliasResolver`] re-runs the alias-producing functions every frame but
//! rebuilds the processor only when their *output value* (or the topic
//! list) actually changed; otherwise the existing processor — memo caches
//! and all — is reused.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use robolog_core::{Alert, MessageEvent, SubscribePayload, Topic};
use serde_json::Value;

use crate::blocks::{BlockId, MessageBlock};
use crate::state::{ActiveData, PlayerState, TopicEndpointMap};

/// Declarative alias map: original topic -> additional names.
pub type TopicAliasMap = HashMap<String, Vec<String>>;

/// One alias produced by an alias function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAlias {
    /// The additional name to expose
    pub name: String,
    /// The recorded topic the alias points at
    pub source_topic_name: String,
}

/// Inputs handed to alias-producing functions.
pub struct AliasContext<'a> {
    pub topics: &'a [Topic],
    pub global_variables: &'a HashMap<String, Value>,
}

/// An alias-producing function registered by an extension.
pub struct AliasFunction {
    /// Identity used in conflict alerts
    pub extension_id: String,
    pub func: Arc<dyn Fn(&AliasContext<'_>) -> Vec<TopicAlias> + Send + Sync>,
}

/// Rebuilds the aliasing processor only when alias outputs change.
pub struct AliasResolver {
    functions: Vec<AliasFunction>,
    last_inputs: Option<(Vec<(String, TopicAlias)>, Vec<String>)>,
    processor: AliasingStateProcessor,
}

impl AliasResolver {
    pub fn new(functions: Vec<AliasFunction>) -> Self {
        Self {
            functions,
            last_inputs: None,
            processor: AliasingStateProcessor::empty(),
        }
    }

    /// The processor for the current frame.
    ///
    /// Invokes every alias function, but compares their output by value
    /// (plus the current topic names) against the previous frame; when
    /// unchanged, the existing processor instance and its memo caches are
    /// returned untouched.
    pub fn state_processor(
        &mut self,
        topics: &[Topic],
        global_variables: &HashMap<String, Value>,
    ) -> &mut AliasingStateProcessor {
        let context = AliasContext {
            topics,
            global_variables,
        };
        let outputs: Vec<(String, TopicAlias)> = self
            .functions
            .iter()
            .flat_map(|function| {
                let extension_id = function.extension_id.clone();
                (function.func)(&context)
                    .into_iter()
                    .map(move |alias| (extension_id.clone(), alias))
            })
            .collect();
        let topic_names: Vec<String> = topics.iter().map(|topic| topic.name.clone()).collect();

        let inputs = (outputs, topic_names);
        if self.last_inputs.as_ref() != Some(&inputs) {
            self.processor = AliasingStateProcessor::new(&inputs.0, topics);
            self.last_inputs = Some(inputs);
        }
        &mut self.processor
    }
}

/// Applies one alias mapping to player state and subscriptions.
pub struct AliasingStateProcessor {
    aliases_by_topic: TopicAliasMap,
    topic_by_alias: HashMap<String, String>,
    conflict_alerts: Vec<Alert>,

    messages_memo: Option<(u64, Arc<Vec<MessageEvent>>)>,
    topics_memo: Option<(u64, Arc<Vec<Topic>>)>,
    published_memo: Option<(u64, Arc<TopicEndpointMap>)>,
    subscribed_memo: Option<(u64, Arc<TopicEndpointMap>)>,

    /// Aliased block per slot, keyed by the input block's generation id
    blocks_memo: HashMap<usize, (BlockId, MessageBlock)>,
    last_blocks: Option<(Vec<Option<BlockId>>, Arc<Vec<Option<MessageBlock>>>)>,
}

impl AliasingStateProcessor {
    fn empty() -> Self {
        Self::new(&[], &[])
    }

    /// Build the mapping, rejecting conflicting aliases with alerts.
    pub fn new(aliases: &[(String, TopicAlias)], topics: &[Topic]) -> Self {
        let real_topics: HashSet<&str> = topics.iter().map(|topic| topic.name.as_str()).collect();

        let mut aliases_by_topic: TopicAliasMap = HashMap::new();
        let mut topic_by_alias: HashMap<String, String> = HashMap::new();
        let mut conflict_alerts = Vec::new();

        for (extension_id, alias) in aliases {
            if real_topics.contains(alias.name.as_str()) {
                conflict_alerts.push(Alert::error(format!(
                    "Alias \"{}\" from {} collides with an existing topic and was dropped",
                    alias.name, extension_id
                )));
                continue;
            }

            match topic_by_alias.get(&alias.name) {
                Some(existing) if existing != &alias.source_topic_name => {
                    conflict_alerts.push(Alert::error(format!(
                        "Alias \"{}\" from {} is already mapped to \"{}\"; mapping to \"{}\" was dropped",
                        alias.name, extension_id, existing, alias.source_topic_name
                    )));
                    continue;
                }
                Some(_) => continue, // same mapping declared twice
                None => {
                    topic_by_alias.insert(alias.name.clone(), alias.source_topic_name.clone());
                    aliases_by_topic
                        .entry(alias.source_topic_name.clone())
                        .or_default()
                        .push(alias.name.clone());
                }
            }
        }

        if !conflict_alerts.is_empty() {
            tracing::warn!(
                dropped = conflict_alerts.len(),
                "Dropped conflicting topic aliases"
            );
        }

        Self {
            aliases_by_topic,
            topic_by_alias,
            conflict_alerts,
            messages_memo: None,
            topics_memo: None,
            published_memo: None,
            subscribed_memo: None,
            blocks_memo: HashMap::new(),
            last_blocks: None,
        }
    }

    /// The alias map currently in effect.
    pub fn alias_map(&self) -> &TopicAliasMap {
        &self.aliases_by_topic
    }

    /// Apply the mapping to one frame of player state.
    pub fn process(&mut self, state: &PlayerState) -> PlayerState {
        let mut out = state.clone();
        out.alerts.extend(self.conflict_alerts.iter().cloned());

        if self.aliases_by_topic.is_empty() {
            return out;
        }

        if let Some(active) = &mut out.active {
            self.apply_active(active);
        }

        if let Some(blocks) = &out.progress.blocks {
            out.progress.blocks = Some(self.apply_blocks(blocks));
        }

        out
    }

    fn apply_active(&mut self, active: &mut ActiveData) {
        let aliases = &self.aliases_by_topic;

        active.messages = memoized(&mut self.messages_memo, active.messages_revision, || {
            Arc::new(alias_messages(aliases, &active.messages))
        });

        active.topics = memoized(&mut self.topics_memo, active.topics_revision, || {
            Arc::new(alias_topics(aliases, &active.topics))
        });

        if let Some(published) = &active.published_topics {
            let aliased = memoized(
                &mut self.published_memo,
                active.published_topics_revision,
                || Arc::new(alias_endpoint_map(aliases, published)),
            );
            active.published_topics = Some(aliased);
        }

        if let Some(subscribed) = &active.subscribed_topics {
            let aliased = memoized(
                &mut self.subscribed_memo,
                active.subscribed_topics_revision,
                || Arc::new(alias_endpoint_map(aliases, subscribed)),
            );
            active.subscribed_topics = Some(aliased);
        }
    }

    fn apply_blocks(
        &mut self,
        blocks: &Arc<Vec<Option<MessageBlock>>>,
    ) -> Arc<Vec<Option<MessageBlock>>> {
        let ids: Vec<Option<BlockId>> = blocks
            .iter()
            .map(|slot| slot.as_ref().map(|block| block.id))
            .collect();

        if let Some((last_ids, cached)) = &self.last_blocks {
            if *last_ids == ids {
                return cached.clone();
            }
        }

        let mut out = Vec::with_capacity(blocks.len());
        for (index, slot) in blocks.iter().enumerate() {
            match slot {
                None => {
                    self.blocks_memo.remove(&index);
                    out.push(None);
                }
                Some(block) => {
                    let cached = match self.blocks_memo.get(&index) {
                        Some((id, aliased)) if *id == block.id => Some(aliased.clone()),
                        _ => None,
                    };
                    let aliased = match cached {
                        Some(aliased) => aliased,
                        None => {
                            let aliased = alias_block(&self.aliases_by_topic, block);
                            self.blocks_memo.insert(index, (block.id, aliased.clone()));
                            aliased
                        }
                    };
                    out.push(Some(aliased));
                }
            }
        }

        let out = Arc::new(out);
        self.last_blocks = Some((ids, out.clone()));
        out
    }

    /// Map subscriptions that may use alias names back to real topics.
    ///
    /// Multiple aliases of one real topic collapse into a single
    /// subscription.
    pub fn alias_subscriptions(&self, subscriptions: &[SubscribePayload]) -> Vec<SubscribePayload> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            let mut mapped = subscription.clone();
            if let Some(real) = self.topic_by_alias.get(&subscription.topic) {
                mapped.topic = real.clone();
            }

            let key = (
                mapped.topic.clone(),
                mapped.normalized_fields(),
                mapped.preload_type,
            );
            if seen.insert(key) {
                out.push(mapped);
            }
        }

        out
    }
}

fn memoized<T: Clone>(
    memo: &mut Option<(u64, T)>,
    revision: u64,
    compute: impl FnOnce() -> T,
) -> T {
    if let Some((cached_revision, value)) = memo {
        if *cached_revision == revision {
            return value.clone();
        }
    }
    let value = compute();
    *memo = Some((revision, value.clone()));
    value
}

fn renamed(event: &MessageEvent, topic: &str) -> MessageEvent {
    MessageEvent {
        topic: topic.to_string(),
        ..event.clone()
    }
}

fn alias_messages(aliases: &TopicAliasMap, messages: &[MessageEvent]) -> Vec<MessageEvent> {
    let mut out = Vec::with_capacity(messages.len());
    for event in messages {
        out.push(event.clone());
        if let Some(names) = aliases.get(&event.topic) {
            for name in names {
                out.push(renamed(event, name));
            }
        }
    }
    out
}

fn alias_topics(aliases: &TopicAliasMap, topics: &[Topic]) -> Vec<Topic> {
    let mut out = Vec::with_capacity(topics.len());
    for topic in topics {
        out.push(topic.clone());
        if let Some(names) = aliases.get(&topic.name) {
            for name in names {
                out.push(Topic {
                    name: name.clone(),
                    schema_name: topic.schema_name.clone(),
                    aliased_from_name: Some(topic.name.clone()),
                });
            }
        }
    }
    out
}

fn alias_endpoint_map(aliases: &TopicAliasMap, map: &TopicEndpointMap) -> TopicEndpointMap {
    let mut out = TopicEndpointMap::with_capacity(map.len());
    for (topic, endpoints) in map {
        out.insert(topic.clone(), endpoints.clone());
        if let Some(names) = aliases.get(topic) {
            for name in names {
                out.insert(name.clone(), endpoints.clone());
            }
        }
    }
    out
}

fn alias_block(aliases: &TopicAliasMap, block: &MessageBlock) -> MessageBlock {
    let mut messages_by_topic = HashMap::with_capacity(block.messages_by_topic.len());
    let mut size_in_bytes = block.size_in_bytes;

    for (topic, messages) in &block.messages_by_topic {
        // Unaffected topics keep the input's own Arc
        messages_by_topic.insert(topic.clone(), messages.clone());
        if let Some(names) = aliases.get(topic) {
            for name in names {
                let duplicated: Vec<MessageEvent> =
                    messages.iter().map(|event| renamed(event, name)).collect();
                size_in_bytes += duplicated.iter().map(|m| m.size_in_bytes).sum::<usize>();
                messages_by_topic.insert(name.clone(), Arc::new(duplicated));
            }
        }
    }

    let mut need_topics = Vec::with_capacity(block.need_topics.len());
    for payload in &block.need_topics {
        need_topics.push(payload.clone());
        if let Some(names) = aliases.get(&payload.topic) {
            for name in names {
                let mut duplicated = payload.clone();
                duplicated.topic = name.clone();
                need_topics.push(duplicated);
            }
        }
    }

    MessageBlock {
        id: BlockId::next(),
        messages_by_topic,
        need_topics,
        size_in_bytes,
    }
}
