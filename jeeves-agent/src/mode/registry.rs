//! Registry mapping mode names to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ChainMoveMode, ChainScoreMode, DrillsMode, ModeHandler, PrincipleLensMode, StudySessionMode,
};
use crate::conversation::ConversationStore;
use crate::turn::TurnProtocol;
use crate::vocabulary::VocabularyValidator;

/// Registry of available modes.
///
/// Built once at startup and shared read-only across requests.
#[derive(Default)]
pub struct ModeRegistry {
    handlers: HashMap<String, Arc<dyn ModeHandler>>,
}

impl ModeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in mode over the process-wide palace.
    pub fn with_defaults(protocol: TurnProtocol) -> Self {
        let validator = Arc::new(VocabularyValidator::palace());
        let store = Arc::new(ConversationStore::palace());

        let mut registry = Self::new();
        registry.register(DrillsMode::new());
        registry.register(PrincipleLensMode::new(Arc::clone(&validator)));
        registry.register(StudySessionMode::new(Arc::clone(&validator), Arc::clone(&store)));
        registry.register(ChainMoveMode::new(protocol.clone(), Arc::clone(&store)));
        registry.register(ChainScoreMode::new(protocol));
        registry
    }

    /// Register a handler, replacing any previous handler for its mode.
    pub fn register(&mut self, handler: impl ModeHandler + 'static) {
        self.handlers
            .insert(handler.mode().to_string(), Arc::new(handler));
    }

    /// Look up a handler by mode name.
    pub fn get(&self, mode: &str) -> Option<Arc<dyn ModeHandler>> {
        self.handlers.get(mode).cloned()
    }

    /// Check if a mode is registered.
    pub fn has(&self, mode: &str) -> bool {
        self.handlers.contains_key(mode)
    }

    /// All registered mode names, sorted.
    pub fn modes(&self) -> Vec<&str> {
        let mut modes: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        modes.sort_unstable();
        modes
    }
}
