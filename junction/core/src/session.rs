use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::destination::Destination;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique session id.
pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Static description of the inbound side of a session: which handler
/// accepted it, where it came from, and where it was headed before any
/// routing decision was applied.
#[derive(Clone, Debug)]
pub struct InboundDescriptor {
    pub tag: String,
    pub source: Destination,
    pub gateway: Destination,
    pub user: Option<String>,
}

/// One hop a session was routed through. A connection may be re-routed,
/// so a session carries an ordered list rather than a single outbound.
#[derive(Clone, Debug)]
pub struct OutboundDescriptor {
    pub tag: String,
    pub destination: Destination,
}

/// The result of sniffing the first bytes of a flow.
#[derive(Clone, Debug, Default)]
pub struct Content {
    pub protocol: Option<String>,
    /// Lowercased key → value, used by the attribute matcher.
    pub attributes: HashMap<String, String>,
    pub sniffing_request: bool,
}

impl Content {
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into().to_lowercase(), value.into());
    }
}

/// Whether a session is a candidate for the zero-copy splice hand-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpliceHint {
    Unknown,
    Eligible,
    InProgress,
    Disabled,
}

/// Per-connection context propagated by reference through the pipeline.
/// Mutable fields are behind a lock because the inbound worker, the
/// dispatcher, and the Vision framing layer may touch them from
/// different points in the same connection's lifetime but never
/// concurrently with each other.
pub struct Session {
    id: u64,
    inbound: InboundDescriptor,
    outbounds: Mutex<Vec<OutboundDescriptor>>,
    content: Mutex<Option<Content>>,
    splice_hint: Mutex<SpliceHint>,
}

impl Session {
    pub fn new(inbound: InboundDescriptor) -> Self {
        Self {
            id: next_session_id(),
            inbound,
            outbounds: Mutex::new(Vec::new()),
            content: Mutex::new(None),
            splice_hint: Mutex::new(SpliceHint::Unknown),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn inbound(&self) -> &InboundDescriptor {
        &self.inbound
    }

    pub fn push_outbound(&self, descriptor: OutboundDescriptor) {
        self.outbounds.lock().push(descriptor);
    }

    pub fn outbounds(&self) -> Vec<OutboundDescriptor> {
        self.outbounds.lock().clone()
    }

    pub fn current_outbound(&self) -> Option<OutboundDescriptor> {
        self.outbounds.lock().last().cloned()
    }

    pub fn set_content(&self, content: Content) {
        *self.content.lock() = Some(content);
    }

    pub fn content(&self) -> Option<Content> {
        self.content.lock().clone()
    }

    pub fn sniffed_protocol(&self) -> Option<String> {
        self.content.lock().as_ref().and_then(|c| c.protocol.clone())
    }

    pub fn set_splice_hint(&self, hint: SpliceHint) {
        *self.splice_hint.lock() = hint;
    }

    pub fn splice_hint(&self) -> SpliceHint {
        *self.splice_hint.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{Address, Network};

    fn dest(port: u16) -> Destination {
        Destination::new(Address::Domain("example.com".into()), port, Network::Tcp)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = Session::new(InboundDescriptor {
            tag: "in".into(),
            source: dest(1),
            gateway: dest(2),
            user: None,
        });
        let b = Session::new(InboundDescriptor {
            tag: "in".into(),
            source: dest(1),
            gateway: dest(2),
            user: None,
        });
        assert!(b.id() > a.id());
    }

    #[test]
    fn outbound_history_accumulates_in_order() {
        let s = Session::new(InboundDescriptor {
            tag: "in".into(),
            source: dest(1),
            gateway: dest(2),
            user: None,
        });
        s.push_outbound(OutboundDescriptor {
            tag: "a".into(),
            destination: dest(80),
        });
        s.push_outbound(OutboundDescriptor {
            tag: "b".into(),
            destination: dest(443),
        });
        assert_eq!(s.current_outbound().unwrap().tag, "b");
        assert_eq!(s.outbounds().len(), 2);
    }
}
