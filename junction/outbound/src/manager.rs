use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use junction_core::{Destination, Error, Result};

use crate::handler::{BoxedStream, OutboundHandler};

/// A tag-indexed registry of outbound handlers, mirroring `leaf`'s
/// `app::outbound::manager`: a flat map plus one designated default,
/// with prefix-based selection for grouping outbounds into a balancer's
/// candidate pool (e.g. every tag starting with `"region-us-"`).
pub struct OutboundManager {
    handlers: Mutex<HashMap<String, Arc<dyn OutboundHandler>>>,
    default_tag: Mutex<Option<String>>,
}

impl OutboundManager {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            default_tag: Mutex::new(None),
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn OutboundHandler>) -> Result<()> {
        let tag = handler.tag().to_string();
        let mut handlers = self.handlers.lock();
        if handlers.contains_key(&tag) {
            return Err(Error::DuplicateTag(tag));
        }
        handlers.insert(tag, handler);
        Ok(())
    }

    pub fn remove_handler(&self, tag: &str) -> bool {
        self.handlers.lock().remove(tag).is_some()
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn OutboundHandler>> {
        self.handlers.lock().get(tag).cloned()
    }

    pub fn set_default(&self, tag: Option<String>) {
        *self.default_tag.lock() = tag;
    }

    pub fn default_handler(&self) -> Option<Arc<dyn OutboundHandler>> {
        let tag = self.default_tag.lock().clone()?;
        self.get(&tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.handlers.lock().keys().cloned().collect()
    }

    /// Every registered tag starting with any of `prefixes`, used to
    /// assemble a balancer's candidate pool from the manager without the
    /// manager knowing anything about balancing.
    pub fn select(&self, prefixes: &[String]) -> Vec<String> {
        self.handlers
            .lock()
            .keys()
            .filter(|tag| prefixes.iter().any(|p| tag.starts_with(p.as_str())))
            .cloned()
            .collect()
    }

    /// Dials `tag` directly — used both for ordinary dispatch and for a
    /// balancer's health-check/benchmark round, which needs to reach a
    /// specific outbound rather than go through routing again.
    pub async fn dial(&self, tag: &str, destination: &Destination) -> Result<BoxedStream> {
        let handler = self.get(tag).ok_or_else(|| Error::UnknownOutbound(tag.to_string()))?;
        handler.dial(destination).await
    }
}

impl Default for OutboundManager {
    fn default() -> Self {
        Self::new()
    }
}
