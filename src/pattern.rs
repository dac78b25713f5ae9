use crate::term::{Envelope, Term};

/// A single position inside a [`Pattern`].
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Matches by equality against a literal term.
    Literal(Term),
    /// Matches any value carrying a process handle.
    AnyProcess,
}

impl Matcher {
    fn matches(&self, term: &Term) -> bool {
        match self {
            Matcher::Literal(expected) => expected == term,
            Matcher::AnyProcess => term.is_handle(),
        }
    }
}

impl From<Term> for Matcher {
    fn from(t: Term) -> Self {
        Matcher::Literal(t)
    }
}

impl From<&str> for Matcher {
    fn from(s: &str) -> Self {
        Matcher::Literal(Term::from(s))
    }
}

/// A sequence of matchers tested positionally against an envelope.
///
/// A pattern matches an envelope iff the lengths are equal and every
/// position matches; arity mismatches never match, regardless of content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pattern(pub Vec<Matcher>);

impl Pattern {
    pub fn new(matchers: Vec<Matcher>) -> Pattern {
        Pattern(matchers)
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        if self.0.len() != envelope.len() {
            return false;
        }
        self.0.iter().zip(envelope.iter()).all(|(m, t)| m.matches(t))
    }
}

impl<const N: usize> From<[Matcher; N]> for Pattern {
    fn from(arr: [Matcher; N]) -> Self {
        Pattern(arr.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_by_equality() {
        let pattern = Pattern::new(vec![Matcher::Literal(Term::atom("ping"))]);
        assert!(pattern.matches(&vec![Term::atom("ping")]));
        assert!(!pattern.matches(&vec![Term::atom("pong")]));
    }

    #[test]
    fn arity_mismatch_never_matches() {
        let pattern = Pattern::new(vec![Matcher::Literal(Term::atom("die"))]);
        assert!(!pattern.matches(&vec![Term::atom("die"), Term::Int(1)]));
        assert!(!pattern.matches(&vec![]));
    }

    #[test]
    fn any_process_matches_handle_terms_only() {
        let pattern = Pattern::new(vec![Matcher::Literal(Term::atom("ping")), Matcher::AnyProcess]);
        assert!(!pattern.matches(&vec![Term::atom("ping"), Term::Int(1)]));
    }
}
