//! The per-session set of agents and their memories.

use crate::persistence::MemoryStore;
use sb_core::{Agent, AgentKind, Memory};
use std::sync::Arc;

const DEFAULT_AGENT_NAME: &str = "jarvis";

/// An agent plus the memory it keeps for this session.
pub struct AgentSlot {
    pub agent: Arc<dyn Agent>,
    pub memory: Memory,
}

impl AgentSlot {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        let memory = agent.initial_memory();
        Self { agent, memory }
    }

    pub fn kind(&self) -> AgentKind {
        self.agent.kind()
    }
}

/// Ordered agents of one session, at most one per kind.
#[derive(Default)]
pub struct AgentRegistry {
    slots: Vec<AgentSlot>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent, replacing any previous agent of the same kind in place.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let slot = AgentSlot::new(agent);
        match self.slots.iter_mut().find(|s| s.kind() == slot.kind()) {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }

    pub fn with_agent(mut self, agent: impl Agent + 'static) -> Self {
        self.register(Arc::new(agent));
        self
    }

    pub fn kinds(&self) -> Vec<AgentKind> {
        self.slots.iter().map(|s| s.kind()).collect()
    }

    pub fn contains(&self, kind: AgentKind) -> bool {
        self.slots.iter().any(|s| s.kind() == kind)
    }

    pub fn get(&self, kind: AgentKind) -> Option<&AgentSlot> {
        self.slots.iter().find(|s| s.kind() == kind)
    }

    pub fn get_mut(&mut self, kind: AgentKind) -> Option<&mut AgentSlot> {
        self.slots.iter_mut().find(|s| s.kind() == kind)
    }

    pub fn memory(&self, kind: AgentKind) -> Option<&Memory> {
        self.get(kind).map(|s| &s.memory)
    }

    pub fn memory_mut(&mut self, kind: AgentKind) -> Option<&mut Memory> {
        self.get_mut(kind).map(|s| &mut s.memory)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentSlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Persona name: the casual agent's name, "jarvis" without one.
    pub fn default_agent_name(&self) -> &str {
        self.get(AgentKind::Casual)
            .map(|s| s.agent.name())
            .unwrap_or(DEFAULT_AGENT_NAME)
    }

    /// Reload persisted memories for every agent except the planner.
    /// Returns how many memories were restored.
    pub async fn recover(&mut self, store: &dyn MemoryStore, cid: &str) -> sb_core::Result<usize> {
        let mut restored = 0;
        for slot in self.slots.iter_mut().filter(|s| s.kind() != AgentKind::Planner) {
            if let Some(memory) = store.load(cid, slot.kind()).await? {
                tracing::debug!(cid, kind = %slot.kind(), turns = memory.len(), "memory recovered");
                slot.memory = memory;
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Persist every agent's memory.
    pub async fn persist(&self, store: &dyn MemoryStore, cid: &str) -> sb_core::Result<()> {
        for slot in &self.slots {
            store.save(cid, slot.kind(), &slot.memory).await?;
        }
        Ok(())
    }
}
