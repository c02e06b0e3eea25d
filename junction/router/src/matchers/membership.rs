use std::collections::HashSet;

use regex::Regex;

use junction_core::regex_error::RegexError;
use junction_core::Error;

use crate::condition::Condition;
use crate::context::RoutingContext;

/// Set membership for inbound tags.
pub struct InboundTagMatcher {
    tags: HashSet<String>,
}

impl InboundTagMatcher {
    pub fn new(tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            tags: tags.into_iter().collect(),
        }
    }
}

impl Condition for InboundTagMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        self.tags.contains(&ctx.inbound_tag)
    }

    fn name(&self) -> &'static str {
        "inbound_tag"
    }
}

enum UserRule {
    Literal(String),
    Regex(Regex),
}

/// User/email membership. Entries prefixed `regexp:` are compiled as
/// regular expressions; everything else is a literal match.
pub struct UserMatcher {
    rules: Vec<UserRule>,
}

impl UserMatcher {
    pub fn compile(entries: &[&str]) -> Result<Self, Error> {
        let mut rules = Vec::with_capacity(entries.len());
        for entry in entries {
            let rule = if let Some(pattern) = entry.strip_prefix("regexp:") {
                UserRule::Regex(
                    Regex::new(pattern).map_err(|e| Error::InvalidRegex(RegexError::new(e)))?,
                )
            } else {
                UserRule::Literal((*entry).to_string())
            };
            rules.push(rule);
        }
        Ok(Self { rules })
    }
}

impl Condition for UserMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        let Some(email) = ctx.user_email.as_deref() else {
            return false;
        };
        self.rules.iter().any(|r| match r {
            UserRule::Literal(lit) => lit == email,
            UserRule::Regex(re) => re.is_match(email),
        })
    }

    fn name(&self) -> &'static str {
        "user"
    }
}

/// Protocol membership via prefix matching, e.g. `"http"` matches both
/// `http` and `http2`.
pub struct ProtocolMatcher {
    prefixes: Vec<String>,
}

impl ProtocolMatcher {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }
}

impl Condition for ProtocolMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        let Some(proto) = ctx.sniffed_protocol.as_deref() else {
            return false;
        };
        self.prefixes.iter().any(|p| proto.starts_with(p.as_str()))
    }

    fn name(&self) -> &'static str {
        "protocol"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::Network;

    #[test]
    fn user_matcher_supports_literal_and_regexp() {
        let m = UserMatcher::compile(&["alice@example.com", r"regexp:^bot-\d+@example\.com$"])
            .unwrap();
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.user_email = Some("alice@example.com".into());
        assert!(m.matches(&ctx));
        ctx.user_email = Some("bot-42@example.com".into());
        assert!(m.matches(&ctx));
        ctx.user_email = Some("mallory@example.com".into());
        assert!(!m.matches(&ctx));
    }

    #[test]
    fn protocol_matcher_uses_prefix() {
        let m = ProtocolMatcher::new(["http".to_string()]);
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.sniffed_protocol = Some("http2".into());
        assert!(m.matches(&ctx));
        ctx.sniffed_protocol = Some("tls".into());
        assert!(!m.matches(&ctx));
    }
}
