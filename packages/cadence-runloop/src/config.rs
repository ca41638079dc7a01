use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const SYNC: &str = "sync";
pub const ACTIONS: &str = "actions";
pub const ROUTER_TRANSITIONS: &str = "routerTransitions";
pub const RENDER: &str = "render";
pub const AFTER_RENDER: &str = "afterRender";
pub const DESTROY: &str = "destroy";

/// Queue layout for every run loop a scheduler creates.
///
/// The order of `queues` is the drain order. Hosts splice in their own
/// queue names with [`insert_before`](Self::insert_before) and friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub queues: Vec<String>,
    /// Queue used by `once`.
    pub default_queue: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queues: [SYNC, ACTIONS, ROUTER_TRANSITIONS, RENDER, AFTER_RENDER, DESTROY]
                .iter()
                .map(|q| q.to_string())
                .collect(),
            default_queue: ACTIONS.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Builds a config from an explicit queue order. The first queue named
    /// `actions` (or the first queue, if there is none) becomes the default.
    pub fn with_queues<I, S>(queues: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues: Vec<String> = queues.into_iter().map(Into::into).collect();
        let default_queue = if queues.iter().any(|q| q == ACTIONS) {
            ACTIONS.to_string()
        } else {
            queues.first().cloned().ok_or(ConfigError::Empty)?
        };
        let config = Self {
            queues,
            default_queue,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn insert_before(mut self, anchor: &str, name: impl Into<String>) -> Result<Self, ConfigError> {
        let idx = self.position(anchor)?;
        self.queues.insert(idx, name.into());
        self.validate()?;
        Ok(self)
    }

    pub fn insert_after(mut self, anchor: &str, name: impl Into<String>) -> Result<Self, ConfigError> {
        let idx = self.position(anchor)?;
        self.queues.insert(idx + 1, name.into());
        self.validate()?;
        Ok(self)
    }

    pub fn push(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
        self.queues.push(name.into());
        self.validate()?;
        Ok(self)
    }

    pub fn default_queue(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
        self.default_queue = name.into();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queues.is_empty() {
            return Err(ConfigError::Empty);
        }
        for (i, name) in self.queues.iter().enumerate() {
            if self.queues[..i].contains(name) {
                return Err(ConfigError::DuplicateQueue(name.clone()));
            }
        }
        if !self.queues.contains(&self.default_queue) {
            return Err(ConfigError::UnknownDefaultQueue(self.default_queue.clone()));
        }
        Ok(())
    }

    fn position(&self, anchor: &str) -> Result<usize, ConfigError> {
        self.queues
            .iter()
            .position(|q| q == anchor)
            .ok_or_else(|| ConfigError::UnknownAnchor(anchor.to_string()))
    }
}
