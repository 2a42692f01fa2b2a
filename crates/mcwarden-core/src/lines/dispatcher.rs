//! Ordered, first-match-wins line dispatch.
//!
//! Rules are evaluated in declaration order against the full line. The first
//! rule whose pattern matches claims the line; later rules never see it. Rule
//! sets are usually written from most specific to most generic, so changing
//! the order changes behaviour.

use regex::{Captures, Regex};
use tracing::{info, trace};

use crate::error::{Error, Result};
use crate::tracing_init::CONSOLE_TARGET;

type Handler = Box<dyn Fn(&Captures<'_>) + Send + Sync>;
type Sink = Box<dyn Fn(&str) + Send + Sync>;

/// A pattern and the handler invoked with its capture groups.
pub struct DispatchRule {
    name: String,
    pattern: Regex,
    handler: Handler,
}

impl DispatchRule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }
}

impl std::fmt::Debug for DispatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// What happened to a dispatched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The rule at this index handled the line.
    Matched(usize),
    /// No rule matched; the line went to the fallback sink.
    Unmatched,
}

/// Immutable ordered rule list plus a fallback sink for unmatched lines.
pub struct LineDispatcher {
    rules: Vec<DispatchRule>,
    fallback: Sink,
}

impl LineDispatcher {
    pub fn builder() -> LineDispatcherBuilder {
        LineDispatcherBuilder::default()
    }

    /// Route one complete line. Runs at most one handler.
    pub fn dispatch(&self, line: &str) -> DispatchOutcome {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(caps) = rule.pattern.captures(line) {
                trace!(rule = %rule.name, "line matched");
                (rule.handler)(&caps);
                return DispatchOutcome::Matched(index);
            }
        }
        (self.fallback)(line);
        DispatchOutcome::Unmatched
    }

    pub fn rules(&self) -> &[DispatchRule] {
        &self.rules
    }
}

impl std::fmt::Debug for LineDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineDispatcher")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

/// Collects rules in order. Patterns are compiled as they are added so an
/// invalid rule set fails at startup rather than at first use.
#[derive(Default)]
pub struct LineDispatcherBuilder {
    rules: Vec<DispatchRule>,
    fallback: Option<Sink>,
}

impl std::fmt::Debug for LineDispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineDispatcherBuilder")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl LineDispatcherBuilder {
    /// Append a rule after all previously added rules.
    pub fn rule<F>(mut self, name: &str, pattern: &str, handler: F) -> Result<Self>
    where
        F: Fn(&Captures<'_>) + Send + Sync + 'static,
    {
        let pattern = Regex::new(pattern).map_err(|source| Error::Pattern {
            rule: name.to_string(),
            source,
        })?;
        self.rules.push(DispatchRule {
            name: name.to_string(),
            pattern,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    /// Replace the default fallback, which logs the line under the console
    /// tracing target.
    #[must_use]
    pub fn fallback<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> LineDispatcher {
        LineDispatcher {
            rules: self.rules,
            fallback: self
                .fallback
                .unwrap_or_else(|| Box::new(|line: &str| info!(target: CONSOLE_TARGET, "{line}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, tag: &str) -> Handler {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Box::new(move |caps: &Captures<'_>| {
            let first = caps.get(1).map_or("", |m| m.as_str());
            log.lock().unwrap().push(format!("{tag}:{first}"));
        })
    }

    #[test]
    fn first_matching_rule_wins() {
        let log = Log::default();
        let dispatcher = LineDispatcher::builder()
            .rule("join", r"(\w+) joined the game", recording(&log, "join"))
            .unwrap()
            .rule("any", r"(.*)", recording(&log, "any"))
            .unwrap()
            .build();

        let outcome = dispatcher.dispatch("steve joined the game");

        assert_eq!(outcome, DispatchOutcome::Matched(0));
        assert_eq!(*log.lock().unwrap(), vec!["join:steve".to_string()]);
    }

    #[test]
    fn later_rule_sees_lines_earlier_rules_skip() {
        let log = Log::default();
        let dispatcher = LineDispatcher::builder()
            .rule("join", r"(\w+) joined the game", recording(&log, "join"))
            .unwrap()
            .rule("any", r"(.*)", recording(&log, "any"))
            .unwrap()
            .build();

        assert_eq!(dispatcher.dispatch("hello"), DispatchOutcome::Matched(1));
        assert_eq!(*log.lock().unwrap(), vec!["any:hello".to_string()]);
    }

    #[test]
    fn unmatched_lines_reach_fallback() {
        let log = Log::default();
        let unmatched = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&unmatched);
        let dispatcher = LineDispatcher::builder()
            .rule("join", r"(\w+) joined the game", recording(&log, "join"))
            .unwrap()
            .fallback(move |line| sink.lock().unwrap().push(line.to_string()))
            .build();

        assert_eq!(
            dispatcher.dispatch("[Server thread/INFO]: Preparing level"),
            DispatchOutcome::Unmatched
        );
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(
            *unmatched.lock().unwrap(),
            vec!["[Server thread/INFO]: Preparing level".to_string()]
        );
    }

    #[test]
    fn empty_rule_set_sends_everything_to_fallback() {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let dispatcher = LineDispatcher::builder()
            .fallback(move |_| *sink.lock().unwrap() += 1)
            .build();
        dispatcher.dispatch("a");
        dispatcher.dispatch("");
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn invalid_pattern_names_the_rule() {
        let err = LineDispatcher::builder()
            .rule("broken", r"(unclosed", |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::Pattern { ref rule, .. } if rule == "broken"));
    }

    #[test]
    fn rules_keep_declaration_order() {
        let dispatcher = LineDispatcher::builder()
            .rule("a", "a", |_| {})
            .unwrap()
            .rule("b", "b", |_| {})
            .unwrap()
            .rule("c", "c", |_| {})
            .unwrap()
            .build();
        let names: Vec<&str> = dispatcher.rules().iter().map(DispatchRule::name).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
