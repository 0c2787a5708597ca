//! Ordered fallback chains: try candidates in order, stop at the first success

use std::fmt;

/// Outcome of running a fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome<T, F> {
    /// Value produced by the first successful candidate
    pub value: Option<T>,
    /// Zero-based index of the winning candidate
    pub winner: Option<usize>,
    /// Failure reported by every candidate tried before the winner (or all of them)
    pub failures: Vec<F>,
}

impl<T, F> FallbackOutcome<T, F> {
    /// Number of candidates actually tried
    pub fn attempts(&self) -> usize {
        self.failures.len() + usize::from(self.value.is_some())
    }

    /// Whether any candidate succeeded
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    /// Convert into a plain `Result`, keeping the collected failures on error
    pub fn into_result(self) -> Result<T, Vec<F>> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(self.failures),
        }
    }
}

/// Run `attempt` for each candidate in order, stopping at the first `Ok`
pub fn first_success<I, C, T, F, A>(candidates: I, mut attempt: A) -> FallbackOutcome<T, F>
where
    I: IntoIterator<Item = C>,
    A: FnMut(C) -> Result<T, F>,
{
    let mut failures = Vec::new();
    for (index, candidate) in candidates.into_iter().enumerate() {
        match attempt(candidate) {
            Ok(value) => {
                return FallbackOutcome {
                    value: Some(value),
                    winner: Some(index),
                    failures,
                }
            }
            Err(failure) => failures.push(failure),
        }
    }
    FallbackOutcome {
        value: None,
        winner: None,
        failures,
    }
}

/// Named strategy list for extraction steps that have several ways to find the same thing
pub struct StrategyChain<'a, In: ?Sized, Out> {
    strategies: Vec<(&'static str, Box<dyn Fn(&In) -> Option<Out> + 'a>)>,
}

impl<'a, In: ?Sized, Out> StrategyChain<'a, In, Out> {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy; earlier strategies win
    pub fn then(mut self, name: &'static str, strategy: impl Fn(&In) -> Option<Out> + 'a) -> Self {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    /// Run strategies in order and return the first hit with the strategy name
    pub fn run(&self, input: &In) -> Option<(&'static str, Out)> {
        first_success(self.strategies.iter(), |(name, strategy)| {
            strategy(input).map(|out| (*name, out)).ok_or(*name)
        })
        .value
    }

    /// Number of registered strategies
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no strategy is registered
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl<In: ?Sized, Out> Default for StrategyChain<'_, In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: ?Sized, Out> fmt::Debug for StrategyChain<'_, In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|(name, _)| *name).collect();
        f.debug_struct("StrategyChain").field("strategies", &names).finish()
    }
}
