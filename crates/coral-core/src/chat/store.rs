//! Conversation message store
//!
//! Holds the viewed conversation's messages and citations. Every change goes
//! through [`ChatStore::dispatch`], which keeps at most one pending bot
//! message in the list.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::citations::CitationIndex;
use super::events::StreamEvent;
use super::types::{
    Citation, ConversationRecord, Document, MessageAgent, SearchQuery, ToolEvent,
};

/// Lifecycle of a bot message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BotState {
    /// Request sent, nothing received yet
    Loading,
    /// Receiving text and citations
    Typing,
    Fulfilled,
    Error,
    Aborted,
}

impl BotState {
    pub fn is_pending(self) -> bool {
        matches!(self, BotState::Loading | BotState::Typing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    pub text: String,
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotMessage {
    pub state: BotState,
    pub text: String,
    pub generation_id: Option<String>,
    pub citations: Vec<Citation>,
    pub documents: Vec<Document>,
    pub tool_events: Vec<ToolEvent>,
    pub search_queries: Vec<SearchQuery>,
    /// Set when `state` is `Error`
    pub error: Option<String>,
}

impl BotMessage {
    fn loading() -> Self {
        Self {
            state: BotState::Loading,
            text: String::new(),
            generation_id: None,
            citations: Vec::new(),
            documents: Vec::new(),
            tool_events: Vec::new(),
            search_queries: Vec::new(),
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    User(UserMessage),
    Bot(BotMessage),
}

impl ChatMessage {
    pub fn as_bot(&self) -> Option<&BotMessage> {
        match self {
            ChatMessage::Bot(bot) => Some(bot),
            ChatMessage::User(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub name: String,
    pub messages: Vec<ChatMessage>,
}

/// Everything that can change the message list
#[derive(Debug, Clone)]
pub enum MessageAction {
    /// The user sent a message; a loading bot message follows it
    Send { text: String, file_ids: Vec<String> },
    /// A decoded stream event
    Event(StreamEvent),
    /// Transport, decode, or finish-reason failure
    Fail(String),
    /// The user cancelled the stream
    Abort,
}

/// Message list plus citation index for the viewed conversation
#[derive(Debug, Clone, Default)]
pub struct ChatStore {
    conversation: Conversation,
    citations: CitationIndex,
    /// Every document seen in this conversation, by id
    documents: HashMap<String, Document>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.conversation.messages
    }

    pub fn citations(&self) -> &CitationIndex {
        &self.citations
    }

    pub fn document(&self, document_id: &str) -> Option<&Document> {
        self.documents.get(document_id)
    }

    /// The in-flight bot message, if any
    pub fn pending(&self) -> Option<&BotMessage> {
        self.pending_index()
            .and_then(|idx| self.conversation.messages[idx].as_bot())
    }

    /// Most recent bot message
    pub fn last_bot(&self) -> Option<&BotMessage> {
        self.conversation
            .messages
            .iter()
            .rev()
            .find_map(ChatMessage::as_bot)
    }

    /// Clear everything and start viewing another conversation
    pub fn reset(&mut self, conversation_id: Option<String>) {
        info!("Chat store reset (conversation: {:?})", conversation_id);
        self.conversation = Conversation {
            id: conversation_id,
            ..Default::default()
        };
        self.citations.clear();
        self.documents.clear();
    }

    /// Replace the store contents with a conversation loaded from the backend
    pub fn hydrate(&mut self, record: &ConversationRecord) {
        self.reset(Some(record.id.clone()));
        self.conversation.name = record.title.clone();

        for stored in &record.messages {
            let message = match stored.agent {
                MessageAgent::User => ChatMessage::User(UserMessage {
                    text: stored.text.clone(),
                    file_ids: stored.file_ids.clone(),
                }),
                MessageAgent::Chatbot => {
                    let mut bot = BotMessage::loading();
                    bot.state = BotState::Fulfilled;
                    bot.text = stored.text.clone();
                    bot.generation_id = stored.generation_id.clone();
                    bot.citations = stored.citations.clone();
                    remember_documents(&mut bot, &mut self.documents, &stored.documents);
                    if let Some(generation_id) = &bot.generation_id {
                        self.citations
                            .index_citations(generation_id, &bot.citations, &self.documents);
                    }
                    ChatMessage::Bot(bot)
                }
            };
            self.conversation.messages.push(message);
        }
        debug!(
            "Hydrated conversation {} with {} messages",
            record.id,
            self.conversation.messages.len()
        );
    }

    /// Apply one action to the message list
    pub fn dispatch(&mut self, action: MessageAction) {
        match action {
            MessageAction::Send { text, file_ids } => self.send(text, file_ids),
            MessageAction::Event(event) => self.apply_event(event),
            MessageAction::Fail(error) => self.fail(error),
            MessageAction::Abort => self.abort(),
        }
    }

    fn pending_index(&self) -> Option<usize> {
        self.conversation
            .messages
            .iter()
            .rposition(|m| m.as_bot().is_some_and(BotMessage::is_pending))
    }

    /// Whether a settled (non-pending) bot message already owns `generation_id`
    fn is_settled_generation(&self, generation_id: &str) -> bool {
        self.conversation
            .messages
            .iter()
            .filter_map(ChatMessage::as_bot)
            .any(|bot| !bot.is_pending() && bot.generation_id.as_deref() == Some(generation_id))
    }

    fn send(&mut self, text: String, file_ids: Vec<String>) {
        if self.pending_index().is_some() {
            warn!("New message sent while a response was pending; aborting the old one");
            self.abort();
        }
        self.conversation
            .messages
            .push(ChatMessage::User(UserMessage { text, file_ids }));
        self.conversation
            .messages
            .push(ChatMessage::Bot(BotMessage::loading()));
    }

    fn fail(&mut self, error: String) {
        warn!("Chat response failed: {}", error);
        match self.pending_index() {
            Some(idx) => {
                if let ChatMessage::Bot(bot) = &mut self.conversation.messages[idx] {
                    bot.state = BotState::Error;
                    bot.error = Some(error);
                }
            }
            None => {
                let mut bot = BotMessage::loading();
                bot.state = BotState::Error;
                bot.error = Some(error);
                self.conversation.messages.push(ChatMessage::Bot(bot));
            }
        }
    }

    fn abort(&mut self) {
        if let Some(idx) = self.pending_index() {
            if let ChatMessage::Bot(bot) = &mut self.conversation.messages[idx] {
                info!("Chat response aborted after {} chars", bot.text.len());
                bot.state = BotState::Aborted;
            }
        }
    }

    fn apply_event(&mut self, event: StreamEvent) {
        if let Some(generation_id) = event.generation_id() {
            if self.is_settled_generation(generation_id) {
                warn!(
                    "Dropping stale {} event for generation {}",
                    event.tag(),
                    generation_id
                );
                return;
            }
        }

        let idx = match self.pending_index() {
            Some(idx) => idx,
            None => {
                self.conversation
                    .messages
                    .push(ChatMessage::Bot(BotMessage::loading()));
                self.conversation.messages.len() - 1
            }
        };

        let ChatStore {
            conversation,
            citations,
            documents,
        } = self;
        let ChatMessage::Bot(bot) = &mut conversation.messages[idx] else {
            return;
        };

        match event {
            StreamEvent::StreamStart {
                generation_id,
                conversation_id,
            } => {
                if generation_id.is_some() {
                    bot.generation_id = generation_id;
                }
                if conversation_id.is_some() {
                    conversation.id = conversation_id;
                }
            }
            StreamEvent::TextGeneration { text } => {
                bot.text.push_str(&text);
                bot.state = BotState::Typing;
            }
            StreamEvent::SearchQueriesGeneration { search_queries } => {
                bot.search_queries.extend(search_queries.iter().cloned());
                bot.tool_events.push(ToolEvent::Search {
                    queries: search_queries,
                });
                bot.state = BotState::Typing;
            }
            StreamEvent::SearchResults {
                documents: new_docs,
            } => {
                remember_documents(bot, documents, &new_docs);
                bot.state = BotState::Typing;
            }
            StreamEvent::ToolCallsChunk {
                tool_call_delta,
                text,
            } => {
                let plan = text.or_else(|| tool_call_delta.and_then(|d| d.text));
                if let Some(plan) = plan {
                    match bot.tool_events.last_mut() {
                        Some(ToolEvent::Plan { text }) => text.push_str(&plan),
                        _ => bot.tool_events.push(ToolEvent::Plan { text: plan }),
                    }
                }
                bot.state = BotState::Typing;
            }
            StreamEvent::ToolCallsGeneration { tool_calls, text } => {
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    let streamed = matches!(
                        bot.tool_events.last(),
                        Some(ToolEvent::Plan { text: plan }) if *plan == text
                    );
                    if !streamed {
                        bot.tool_events.push(ToolEvent::Plan { text });
                    }
                }
                bot.tool_events.push(ToolEvent::Calls { calls: tool_calls });
                bot.state = BotState::Typing;
            }
            StreamEvent::CitationGeneration {
                citations: new_citations,
            } => {
                if let Some(generation_id) = &bot.generation_id {
                    citations.index_citations(generation_id, &new_citations, documents);
                }
                bot.citations.extend(new_citations);
                bot.state = BotState::Typing;
            }
            StreamEvent::ToolInput { input } => {
                bot.tool_events.push(ToolEvent::Input { input });
                bot.state = BotState::Typing;
            }
            StreamEvent::ToolResult {
                result,
                documents: new_docs,
            } => {
                remember_documents(bot, documents, &new_docs);
                bot.tool_events.push(ToolEvent::Result { result });
                bot.state = BotState::Typing;
            }
            StreamEvent::StreamEnd(end) => {
                if end.generation_id.is_some() {
                    bot.generation_id = end.generation_id;
                }
                if end.conversation_id.is_some() {
                    conversation.id = end.conversation_id;
                }
                remember_documents(bot, documents, &end.documents);
                if let Some(text) = end.text.filter(|t| !t.is_empty()) {
                    bot.text = text;
                }
                if !end.citations.is_empty() {
                    bot.citations = end.citations;
                }
                if bot.search_queries.is_empty() {
                    bot.search_queries = end.search_queries;
                }

                if end.finish_reason.is_complete() {
                    bot.state = BotState::Fulfilled;
                } else {
                    bot.state = BotState::Error;
                    bot.error = Some(
                        end.error
                            .unwrap_or_else(|| format!("generation stopped ({})", end.finish_reason)),
                    );
                }
                if let Some(generation_id) = &bot.generation_id {
                    citations.index_citations(generation_id, &bot.citations, documents);
                }
                info!(
                    "Generation {:?} finished as {:?}: {} chars, {} citations",
                    bot.generation_id,
                    bot.state,
                    bot.text.len(),
                    bot.citations.len()
                );
            }
            StreamEvent::NonStreamedChatResponse {
                text,
                generation_id,
                conversation_id,
                citations: new_citations,
                documents: new_docs,
            } => {
                if generation_id.is_some() {
                    bot.generation_id = generation_id;
                }
                if conversation_id.is_some() {
                    conversation.id = conversation_id;
                }
                remember_documents(bot, documents, &new_docs);
                bot.text = text;
                bot.citations = new_citations;
                bot.state = BotState::Fulfilled;
                if let Some(generation_id) = &bot.generation_id {
                    citations.index_citations(generation_id, &bot.citations, documents);
                }
            }
        }
    }
}

/// Record documents on the message and in the conversation-wide map
fn remember_documents(
    bot: &mut BotMessage,
    known: &mut HashMap<String, Document>,
    documents: &[Document],
) {
    for doc in documents {
        known.insert(doc.document_id.clone(), doc.clone());
        if !bot
            .documents
            .iter()
            .any(|d| d.document_id == doc.document_id)
        {
            bot.documents.push(doc.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::citations::span_key;
    use crate::chat::events::StreamEnd;
    use crate::chat::types::{FinishReason, StoredMessage};

    fn doc(id: &str) -> Document {
        Document {
            document_id: id.to_string(),
            title: Some(format!("Doc {}", id)),
            ..Default::default()
        }
    }

    fn start(generation_id: &str) -> StreamEvent {
        StreamEvent::StreamStart {
            generation_id: Some(generation_id.to_string()),
            conversation_id: Some("c1".to_string()),
        }
    }

    fn text(t: &str) -> StreamEvent {
        StreamEvent::TextGeneration {
            text: t.to_string(),
        }
    }

    fn end(generation_id: &str, reason: FinishReason) -> StreamEvent {
        StreamEvent::StreamEnd(StreamEnd {
            finish_reason: reason,
            error: None,
            text: None,
            generation_id: Some(generation_id.to_string()),
            conversation_id: None,
            citations: vec![],
            documents: vec![],
            search_queries: vec![],
            tool_calls: vec![],
        })
    }

    fn send(store: &mut ChatStore, t: &str) {
        store.dispatch(MessageAction::Send {
            text: t.to_string(),
            file_ids: vec![],
        });
    }

    fn bots_with_generation(store: &ChatStore, generation_id: &str) -> usize {
        store
            .messages()
            .iter()
            .filter_map(ChatMessage::as_bot)
            .filter(|b| b.generation_id.as_deref() == Some(generation_id))
            .count()
    }

    #[test]
    fn test_full_exchange_fulfills_one_message() {
        let mut store = ChatStore::new();
        send(&mut store, "Where is the Eiffel tower?");
        assert_eq!(store.pending().unwrap().state, BotState::Loading);

        store.dispatch(MessageAction::Event(start("g1")));
        assert_eq!(store.pending().unwrap().state, BotState::Loading);
        store.dispatch(MessageAction::Event(StreamEvent::SearchResults {
            documents: vec![doc("d1")],
        }));
        store.dispatch(MessageAction::Event(text("It is in ")));
        assert_eq!(store.pending().unwrap().state, BotState::Typing);
        store.dispatch(MessageAction::Event(text("Paris.")));
        store.dispatch(MessageAction::Event(StreamEvent::CitationGeneration {
            citations: vec![Citation {
                start: 9,
                end: 14,
                text: "Paris".into(),
                document_ids: vec!["d1".into()],
            }],
        }));
        store.dispatch(MessageAction::Event(end("g1", FinishReason::Complete)));

        assert_eq!(store.messages().len(), 2);
        assert!(store.pending().is_none());
        let bot = store.last_bot().unwrap();
        assert_eq!(bot.state, BotState::Fulfilled);
        assert_eq!(bot.text, "It is in Paris.");
        assert_eq!(bot.documents.len(), 1);
        assert_eq!(store.conversation().id.as_deref(), Some("c1"));
        assert_eq!(bots_with_generation(&store, "g1"), 1);

        let docs = store.citations().get("g1", &span_key(9, 14)).unwrap();
        assert_eq!(docs[0].document_id, "d1");
    }

    #[test]
    fn test_stream_end_error_reason_is_error() {
        let mut store = ChatStore::new();
        send(&mut store, "hi");
        store.dispatch(MessageAction::Event(start("g1")));
        store.dispatch(MessageAction::Event(text("partial")));
        store.dispatch(MessageAction::Event(end("g1", FinishReason::Error)));

        let bot = store.last_bot().unwrap();
        assert_eq!(bot.state, BotState::Error);
        assert!(bot.error.is_some());
    }

    #[test]
    fn test_fail_and_abort_only_touch_pending() {
        let mut store = ChatStore::new();
        send(&mut store, "one");
        store.dispatch(MessageAction::Fail("connection refused".into()));
        assert_eq!(store.last_bot().unwrap().state, BotState::Error);
        assert_eq!(
            store.last_bot().unwrap().error.as_deref(),
            Some("connection refused")
        );

        send(&mut store, "two");
        store.dispatch(MessageAction::Event(text("abc")));
        store.dispatch(MessageAction::Abort);
        assert_eq!(store.last_bot().unwrap().state, BotState::Aborted);
        assert_eq!(store.last_bot().unwrap().text, "abc");

        // Nothing pending: abort is a no-op
        store.dispatch(MessageAction::Abort);
        assert_eq!(store.messages().len(), 4);
    }

    #[test]
    fn test_sending_again_keeps_single_pending() {
        let mut store = ChatStore::new();
        send(&mut store, "one");
        send(&mut store, "two");

        let pending: Vec<_> = store
            .messages()
            .iter()
            .filter_map(ChatMessage::as_bot)
            .filter(|b| b.is_pending())
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            store.messages()[1].as_bot().unwrap().state,
            BotState::Aborted
        );
    }

    #[test]
    fn test_event_without_pending_appends_message() {
        let mut store = ChatStore::new();
        store.dispatch(MessageAction::Event(text("hello")));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.pending().unwrap().state, BotState::Typing);
    }

    #[test]
    fn test_stale_generation_event_is_dropped() {
        let mut store = ChatStore::new();
        send(&mut store, "hi");
        store.dispatch(MessageAction::Event(start("g1")));
        store.dispatch(MessageAction::Event(text("done")));
        store.dispatch(MessageAction::Event(end("g1", FinishReason::Complete)));

        // A replayed terminal event for the same generation
        store.dispatch(MessageAction::Event(end("g1", FinishReason::Complete)));
        store.dispatch(MessageAction::Event(start("g1")));

        assert_eq!(bots_with_generation(&store, "g1"), 1);
        assert!(store.pending().is_none());
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn test_replayed_generation_not_merged_into_new_pending() {
        let mut store = ChatStore::new();
        send(&mut store, "first");
        store.dispatch(MessageAction::Event(start("g1")));
        store.dispatch(MessageAction::Event(text("one")));
        store.dispatch(MessageAction::Event(end("g1", FinishReason::Complete)));

        send(&mut store, "second");
        store.dispatch(MessageAction::Event(start("g1")));
        assert_eq!(bots_with_generation(&store, "g1"), 1);
        let pending = store.pending().unwrap();
        assert_eq!(pending.state, BotState::Loading);
        assert_eq!(pending.generation_id, None);

        store.dispatch(MessageAction::Event(start("g2")));
        store.dispatch(MessageAction::Event(text("two")));
        store.dispatch(MessageAction::Event(end("g2", FinishReason::Complete)));
        assert_eq!(bots_with_generation(&store, "g2"), 1);
        assert_eq!(store.last_bot().unwrap().text, "two");
    }

    #[test]
    fn test_tool_events_accumulate() {
        let mut store = ChatStore::new();
        send(&mut store, "calc");
        store.dispatch(MessageAction::Event(StreamEvent::ToolCallsChunk {
            tool_call_delta: None,
            text: Some("I will ".into()),
        }));
        store.dispatch(MessageAction::Event(StreamEvent::ToolCallsChunk {
            tool_call_delta: None,
            text: Some("calculate.".into()),
        }));
        store.dispatch(MessageAction::Event(StreamEvent::ToolCallsGeneration {
            tool_calls: vec![],
            text: Some("I will calculate.".into()),
        }));
        store.dispatch(MessageAction::Event(StreamEvent::ToolResult {
            result: "4".into(),
            documents: vec![doc("calc-0")],
        }));

        let bot = store.pending().unwrap();
        assert_eq!(
            bot.tool_events,
            vec![
                ToolEvent::Plan {
                    text: "I will calculate.".into()
                },
                ToolEvent::Calls { calls: vec![] },
                ToolEvent::Result { result: "4".into() },
            ]
        );
        assert!(store.document("calc-0").is_some());
    }

    #[test]
    fn test_hydrate_indexes_citations() {
        let record = ConversationRecord {
            id: "c9".into(),
            title: "Towers".into(),
            messages: vec![
                StoredMessage {
                    text: "hi".into(),
                    agent: MessageAgent::User,
                    generation_id: None,
                    documents: vec![],
                    citations: vec![],
                    file_ids: vec![],
                },
                StoredMessage {
                    text: "Paris".into(),
                    agent: MessageAgent::Chatbot,
                    generation_id: Some("g7".into()),
                    documents: vec![doc("d1")],
                    citations: vec![Citation {
                        start: 0,
                        end: 5,
                        text: "Paris".into(),
                        document_ids: vec!["d1".into()],
                    }],
                    file_ids: vec![],
                },
            ],
            created_at: None,
            updated_at: None,
        };

        let mut store = ChatStore::new();
        send(&mut store, "left over");
        store.hydrate(&record);

        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.conversation().name, "Towers");
        assert_eq!(store.citations().get("g7", "0-5").unwrap().len(), 1);

        store.reset(None);
        assert!(store.messages().is_empty());
        assert!(store.citations().is_empty());
        assert!(store.document("d1").is_none());
    }
}
