//! Naming heuristics: pairwise decisions on which of two names to keep.
//!
//! A [`RuleSet`] is an ordered list of pure rules plus a fallback. Rules are
//! evaluated in order against both names; the first rule that tells them apart
//! decides. Only pairwise comparisons are ever made, so a rule set does not
//! have to be a total order.

use std::fmt;

/// How a rule scores a single name.
#[derive(Clone, Copy)]
pub enum RuleFn {
    /// `true` is preferred.
    Flag(fn(&str) -> bool),
    /// Greater is preferred.
    Rank(fn(&str) -> i64),
}

/// A named scoring function.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub eval: RuleFn,
}

impl Rule {
    pub const fn flag(name: &'static str, f: fn(&str) -> bool) -> Self {
        Self {
            name,
            eval: RuleFn::Flag(f),
        }
    }

    pub const fn rank(name: &'static str, f: fn(&str) -> i64) -> Self {
        Self {
            name,
            eval: RuleFn::Rank(f),
        }
    }

    fn score(&self, name: &str) -> i64 {
        match self.eval {
            RuleFn::Flag(f) => f(name) as i64,
            RuleFn::Rank(f) => f(name),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rule").field(&self.name).finish()
    }
}

/// Decides `a` over `b` when no rule tells them apart.
pub type Fallback = fn(&str, &str) -> bool;

/// An ordered rule list with its fallback.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    fallback: Fallback,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, fallback: Fallback) -> Self {
        Self { rules, fallback }
    }

    /// True if `a` should win over `b`.
    pub fn prefers_first(&self, a: &str, b: &str) -> bool {
        prefers_first(&self.rules, self.fallback, a, b)
    }

    /// Stock rules for struct/union members, enumerators and arguments.
    pub fn members() -> Self {
        Self::new(
            vec![
                Rule::flag("not placeholder", |m| m != "__placeholder"),
                Rule::flag("is vtable", |m| m == "__vtable"),
                Rule::flag("no leading underscore", |m| !m.starts_with('_')),
                Rule::flag("not field_", |m| !m.starts_with("field_")),
                Rule::flag("not empty", |m| !m.is_empty()),
                // Any run of hex digits, e.g. `a`, `ab` or `89`.
                Rule::flag("not hex digits", |m| !"0123456789abcdefABCDEF".contains(m)),
            ],
            |_new, _old| true,
        )
    }

    /// Stock rules for whole function and data symbol names.
    pub fn symbols() -> Self {
        Self::new(
            vec![
                Rule::flag("not empty", |m| !m.is_empty()),
                Rule::flag("not auto-named", |m| {
                    !m.starts_with("sub_") && !m.starts_with("nullsub_") && !m.starts_with("j_")
                }),
                Rule::flag("mangled", |m| m.starts_with("_Z")),
            ],
            |new, _old| new.starts_with("_Z"),
        )
    }
}

/// Decide whether `a` is preferred over `b` by the first rule that
/// distinguishes them, else by `fallback(a, b)`.
pub fn prefers_first(rules: &[Rule], fallback: Fallback, a: &str, b: &str) -> bool {
    match decide(rules, a, b) {
        Some(r) => r,
        None => fallback(a, b),
    }
}

fn decide(rules: &[Rule], a: &str, b: &str) -> Option<bool> {
    rules.iter().find_map(|rule| {
        let (sa, sb) = (rule.score(a), rule.score(b));
        (sa != sb).then_some(sa > sb)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_distinguishing_rule_decides() {
        let rules = RuleSet::members();
        assert!(rules.prefers_first("m_flag", "field_0"));
        assert!(!rules.prefers_first("field_0", "m_flag"));
        // `__vtable` beats the leading-underscore rule because it comes first.
        assert!(rules.prefers_first("__vtable", "vptr"));
        assert!(!rules.prefers_first("__placeholder", "x"));
    }

    #[test]
    fn member_fallback_prefers_new_name() {
        let rules = RuleSet::members();
        assert!(rules.prefers_first("m_width", "mWidth"));
        assert!(rules.prefers_first("mWidth", "m_width"));
    }

    #[test]
    fn symbol_rules() {
        let rules = RuleSet::symbols();
        assert!(rules.prefers_first("_ZN3foo3barEv", "sub_7100001234"));
        assert!(!rules.prefers_first("sub_7100001234", "_ZN3foo3barEv"));
        assert!(rules.prefers_first("_ZN3foo3barEv", "_ZN3foo3bazEv"));
        assert!(!rules.prefers_first("foo", "bar"));
        assert!(rules.prefers_first("foo", ""));
    }

    #[test]
    fn rank_rules_prefer_greater() {
        let rules = RuleSet::new(vec![Rule::rank("len", |m| m.len() as i64)], |_, _| false);
        assert!(rules.prefers_first("longer", "short"));
        assert!(!rules.prefers_first("short", "longer"));
        assert!(!rules.prefers_first("same", "size"));
    }

    #[test]
    fn non_transitive_rules_are_accepted() {
        // Rock-paper-scissors on the first letter.
        fn beats(a: &str, b: &str) -> bool {
            matches!(
                (a.as_bytes().first(), b.as_bytes().first()),
                (Some(b'r'), Some(b's')) | (Some(b's'), Some(b'p')) | (Some(b'p'), Some(b'r'))
            )
        }
        let rules = RuleSet::new(Vec::new(), beats);
        assert!(rules.prefers_first("rock", "scissors"));
        assert!(rules.prefers_first("scissors", "paper"));
        assert!(!rules.prefers_first("rock", "paper"));
        assert!(rules.prefers_first("paper", "rock"));
    }

    #[test]
    fn rule_list_with_cycle_in_tied_names() {
        // Per-name scores order names lexicographically, so a cycle can only
        // form among names every rule ties on.
        fn beats(a: &str, b: &str) -> bool {
            matches!(
                (a.trim_start_matches('_').as_bytes().first(), b.trim_start_matches('_').as_bytes().first()),
                (Some(b'r'), Some(b's')) | (Some(b's'), Some(b'p')) | (Some(b'p'), Some(b'r'))
            )
        }
        let rules = RuleSet::new(
            vec![
                Rule::flag("no leading underscore", |m| !m.starts_with('_')),
                Rule::rank("short", |m| -(m.len().min(8) as i64 / 8)),
            ],
            beats,
        );
        // The rules decide against outsiders, whatever the fallback says.
        assert!(rules.prefers_first("rock", "_paper"));
        assert!(!rules.prefers_first("_paper", "rock"));
        assert!(rules.prefers_first("paper", "scissors"));
        assert!(!rules.prefers_first("scissors", "paper"));
        // Tied names keep the fallback's cycle.
        assert!(rules.prefers_first("rock", "sciss"));
        assert!(rules.prefers_first("sciss", "paper"));
        assert!(rules.prefers_first("paper", "rock"));
    }

    #[test]
    fn hex_digit_runs_lose() {
        let rules = RuleSet::members();
        assert!(rules.prefers_first("mode", "a"));
        assert!(rules.prefers_first("mode", "ab"));
        assert!(rules.prefers_first("mode", "89"));
        assert!(!rules.prefers_first("def", "mode"));
        // Not a contiguous run of the digit string.
        assert!(rules.prefers_first("fa", "mode"));
    }
}
