use regex::Regex;

use junction_core::regex_error::RegexError;
use junction_core::Error;

use crate::condition::Condition;
use crate::context::RoutingContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainMatchType {
    /// Plain substring match.
    Plain,
    Regex,
    /// Dotted-suffix match: `example.com` matches `www.example.com`.
    Subdomain,
    /// Exact match.
    Full,
}

enum Rule {
    Plain(String),
    Regex(Regex),
    Subdomain(String),
    Full(String),
}

impl Rule {
    fn hits(&self, domain: &str) -> bool {
        match self {
            Rule::Plain(needle) => domain.contains(needle.as_str()),
            Rule::Regex(re) => re.is_match(domain),
            Rule::Subdomain(suffix) => {
                domain == suffix || domain.ends_with(&format!(".{suffix}"))
            }
            Rule::Full(exact) => domain == exact,
        }
    }
}

/// Domain membership, compiled from a flat list of `(type, pattern)`
/// pairs. Lookups are case-insensitive; patterns are lower-cased once at
/// compile time rather than on every lookup.
pub struct DomainMatcher {
    rules: Vec<Rule>,
}

impl DomainMatcher {
    pub fn compile(patterns: &[(DomainMatchType, &str)]) -> Result<Self, Error> {
        let mut rules = Vec::with_capacity(patterns.len());
        for (ty, pattern) in patterns {
            let lowered = pattern.to_lowercase();
            let rule = match ty {
                DomainMatchType::Plain => Rule::Plain(lowered),
                DomainMatchType::Subdomain => Rule::Subdomain(lowered),
                DomainMatchType::Full => Rule::Full(lowered),
                DomainMatchType::Regex => {
                    let re = Regex::new(&lowered)
                        .map_err(|e| Error::InvalidRegex(RegexError::new(e)))?;
                    Rule::Regex(re)
                }
            };
            rules.push(rule);
        }
        Ok(Self { rules })
    }
}

impl Condition for DomainMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        let domain = match ctx.target_domain.as_deref() {
            Some(d) => d.to_lowercase(),
            None => return false,
        };
        self.rules.iter().any(|r| r.hits(&domain))
    }

    fn name(&self) -> &'static str {
        "domain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::Network;

    fn ctx_for(domain: &str) -> RoutingContext {
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.target_domain = Some(domain.to_string());
        ctx
    }

    #[test]
    fn subdomain_matches_suffix_and_exact() {
        let m = DomainMatcher::compile(&[(DomainMatchType::Subdomain, "example.com")]).unwrap();
        assert!(m.matches(&ctx_for("www.example.com")));
        assert!(m.matches(&ctx_for("example.com")));
        assert!(!m.matches(&ctx_for("notexample.com")));
    }

    #[test]
    fn full_requires_exact_match_case_insensitive() {
        let m = DomainMatcher::compile(&[(DomainMatchType::Full, "Example.com")]).unwrap();
        assert!(m.matches(&ctx_for("example.com")));
        assert!(!m.matches(&ctx_for("www.example.com")));
    }

    #[test]
    fn regex_pattern_is_honored() {
        let m = DomainMatcher::compile(&[(DomainMatchType::Regex, r"^api\d+\.example\.com$")])
            .unwrap();
        assert!(m.matches(&ctx_for("api1.example.com")));
        assert!(!m.matches(&ctx_for("api.example.com")));
    }
}
