//! Target resolution from ids and free-text hints.
//!
//! Hints are compared case-insensitively against every target's id and
//! display name. Exact matches win over substring matches; a substring
//! match is only considered when nothing matches exactly.

use shellgate_core::{BrokerError, Target};
use thiserror::Error;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetQuery {
    /// Exact target id.
    Id(String),
    /// Free-text hint matched against ids and display names.
    Hint(String),
    /// Caller did not name a target.
    Unspecified,
}

impl TargetQuery {
    /// Build from optional explicit id and hint; the id takes precedence.
    #[must_use]
    pub fn from_parts(id: Option<String>, hint: Option<String>) -> Self {
        let non_blank = |s: String| if s.trim().is_empty() { None } else { Some(s) };
        match (id.and_then(non_blank), hint.and_then(non_blank)) {
            (Some(id), _) => Self::Id(id),
            (None, Some(hint)) => Self::Hint(hint),
            (None, None) => Self::Unspecified,
        }
    }
}

/// Resolution failure. Listings use [`Target::label`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No target matches \"{query}\"")]
    NotFound { query: String, available: Vec<String> },
    #[error("\"{query}\" matches more than one target")]
    Ambiguous { query: String, candidates: Vec<String> },
    #[error("No target specified and no targets are configured")]
    NoTargets,
    #[error("No target specified and several are configured")]
    Unspecified { available: Vec<String> },
}

impl ResolveError {
    /// Suggestion string for the caller.
    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::NotFound { available: list, .. }
            | Self::Ambiguous { candidates: list, .. }
            | Self::Unspecified { available: list } => list.join(", "),
            Self::NoTargets => String::new(),
        }
    }
}

impl From<ResolveError> for BrokerError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound { query, available } => Self::NotFound {
                what: format!("Target \"{query}\""),
                suggestions: available,
            },
            ResolveError::Ambiguous { query, candidates } => Self::Ambiguous { query, candidates },
            ResolveError::NoTargets => Self::not_found("Target"),
            ResolveError::Unspecified { available } => Self::Validation(format!(
                "target is required when more than one is configured (options: {})",
                available.join(", ")
            )),
        }
    }
}

fn labels<'a>(targets: impl IntoIterator<Item = &'a Target>) -> Vec<String> {
    targets.into_iter().map(Target::label).collect()
}

/// Resolve a query against a snapshot of every known target.
///
/// # Errors
/// See [`ResolveError`].
pub fn resolve(targets: &[Target], query: &TargetQuery) -> Result<Target, ResolveError> {
    match query {
        TargetQuery::Id(id) => targets
            .iter()
            .find(|t| t.id == *id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                query: id.clone(),
                available: labels(targets),
            }),
        TargetQuery::Hint(hint) => resolve_hint(targets, hint),
        TargetQuery::Unspecified => resolve_default(targets),
    }
}

/// Resolve a free-text hint.
///
/// # Errors
/// `NotFound` listing every target, or `Ambiguous` listing the candidates.
pub fn resolve_hint(targets: &[Target], hint: &str) -> Result<Target, ResolveError> {
    let needle = hint.trim().to_lowercase();
    let fields = |t: &Target| {
        let id = t.id.to_lowercase();
        let name = t.display_name.as_deref().map(str::to_lowercase);
        (id, name)
    };

    let exact: Vec<&Target> = targets
        .iter()
        .filter(|t| {
            let (id, name) = fields(t);
            id == needle || name.as_deref() == Some(needle.as_str())
        })
        .collect();

    let candidates = if exact.is_empty() {
        targets
            .iter()
            .filter(|t| {
                let (id, name) = fields(t);
                id.contains(&needle) || name.is_some_and(|n| n.contains(&needle))
            })
            .collect()
    } else {
        exact
    };

    match candidates.as_slice() {
        [] => Err(ResolveError::NotFound {
            query: hint.to_string(),
            available: labels(targets),
        }),
        [only] => Ok((*only).clone()),
        many => Err(ResolveError::Ambiguous {
            query: hint.to_string(),
            candidates: labels(many.iter().copied()),
        }),
    }
}

/// Resolve when the caller named no target: succeeds only with exactly one.
///
/// # Errors
/// `NoTargets` when the registry is empty, `Unspecified` when it holds several.
pub fn resolve_default(targets: &[Target]) -> Result<Target, ResolveError> {
    match targets {
        [] => Err(ResolveError::NoTargets),
        [only] => Ok(only.clone()),
        many => Err(ResolveError::Unspecified {
            available: labels(many),
        }),
    }
}
