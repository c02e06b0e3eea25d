use regex::Regex;

use junction_core::regex_error::RegexError;
use junction_core::Error;

use crate::condition::Condition;
use crate::context::RoutingContext;

/// All listed attributes must be present and match their compiled
/// regex. Keys are lower-cased at compile time to line up with
/// `Session`'s lowercased attribute map.
pub struct AttributeMatcher {
    rules: Vec<(String, Regex)>,
}

impl AttributeMatcher {
    pub fn compile(entries: &[(&str, &str)]) -> Result<Self, Error> {
        let mut rules = Vec::with_capacity(entries.len());
        for (key, pattern) in entries {
            let re = Regex::new(pattern).map_err(|e| Error::InvalidRegex(RegexError::new(e)))?;
            rules.push((key.to_lowercase(), re));
        }
        Ok(Self { rules })
    }
}

impl Condition for AttributeMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        self.rules.iter().all(|(key, re)| {
            ctx.attribute(key).map(|v| re.is_match(v)).unwrap_or(false)
        })
    }

    fn name(&self) -> &'static str {
        "attribute"
    }
}
