//! Rule-based entity extraction and deictic reference resolution.
//!
//! Extraction is pure pattern matching: no filesystem or network probes, so
//! the same text always yields the same candidates. Reference resolution is
//! best-effort by design; when nothing plausible matches it returns `None`
//! and the caller moves on with the query as written.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Entity, EntityKind, Session};

/// Rooted path: `/...`, `~/...`, or `./...`.
static PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:~|\.)?/[A-Za-z0-9_./-]+").expect("path pattern"));

/// GitHub slug with optional scheme, or any http(s) URL ending in `.git`.
static REPO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:https?://)?(?:www\.)?github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+|https?://[A-Za-z0-9_./-]+\.git",
    )
    .expect("repo pattern")
});

/// Short token in backticks or quotes.
static IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"`([^`\s]{1,64})`|'([A-Za-z0-9_.:/-]{1,64})'|"([A-Za-z0-9_.:/-]{1,64})""#)
        .expect("ident pattern")
});

/// Deictic markers, longest alternatives first so "that file" beats "that".
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(that file|this file|the file|that directory|the directory|that folder|the folder|that repository|the repository|that repo|the repo|it|this|that)\b",
    )
    .expect("marker pattern")
});

/// Verbs that take a path, directory, or repository as their object.
static TARGET_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(extract|read|open|show|display|cat|summarize|analyze|clone|fetch|pull|download|list)\b",
    )
    .expect("verb pattern")
});

/// An entity mention found in text, before it is merged into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCandidate {
    pub kind: EntityKind,
    pub value: String,
}

/// Extracts entity mentions from query/response text and resolves deictic
/// back-references against a session's tracked entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityTracker;

impl EntityTracker {
    pub fn new() -> Self {
        Self
    }

    /// Find entity mentions in `text`, in order of appearance.
    ///
    /// Repository references win over paths, paths over quoted identifiers;
    /// a span claimed by an earlier rule is invisible to later ones.
    /// Duplicate `(kind, value)` mentions collapse to the first.
    pub fn extract(&self, text: &str) -> Vec<EntityCandidate> {
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut found: Vec<(usize, EntityCandidate)> = Vec::new();

        for m in REPO.find_iter(text) {
            let value = canonical_repo(m.as_str());
            if value.is_empty() {
                continue;
            }
            claimed.push((m.start(), m.end()));
            found.push((
                m.start(),
                EntityCandidate {
                    kind: EntityKind::Repository,
                    value,
                },
            ));
        }

        for m in PATH.find_iter(text) {
            if overlaps(&claimed, m.start(), m.end()) || glued_to_token(text, m.start()) {
                continue;
            }
            let Some((kind, value)) = canonical_path(m.as_str()) else {
                continue;
            };
            claimed.push((m.start(), m.end()));
            found.push((m.start(), EntityCandidate { kind, value }));
        }

        for caps in IDENT.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0 always present");
            if overlaps(&claimed, whole.start(), whole.end()) {
                continue;
            }
            let value = caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|g| g.as_str().to_string())
                .unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            claimed.push((whole.start(), whole.end()));
            found.push((
                whole.start(),
                EntityCandidate {
                    kind: EntityKind::Identifier,
                    value,
                },
            ));
        }

        found.sort_by_key(|(start, _)| *start);

        let mut candidates: Vec<EntityCandidate> = Vec::with_capacity(found.len());
        for (_, candidate) in found {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Fold candidates into the session at the given interaction sequence.
    ///
    /// `(kind, value)` stays unique: known entities get their
    /// `last_referenced` bumped, new ones are appended.
    pub fn merge(&self, session: &mut Session, candidates: &[EntityCandidate], sequence: u64) {
        for candidate in candidates {
            match session
                .entities
                .iter_mut()
                .find(|e| e.kind == candidate.kind && e.value == candidate.value)
            {
                Some(entity) => entity.last_referenced = sequence,
                None => session
                    .entities
                    .push(Entity::new(candidate.kind, candidate.value.clone(), sequence)),
            }
        }
    }

    /// Resolve the first deictic marker in `query` to a tracked entity.
    pub fn resolve_reference(&self, query: &str, session: &Session) -> Option<Entity> {
        let (_, entity) = self.find_reference(query, session)?;
        Some(entity)
    }

    /// Resolve the first deictic marker and splice the entity's value into
    /// the query, returning the rewritten text and the entity.
    pub fn rewrite_reference(&self, query: &str, session: &Session) -> Option<(String, Entity)> {
        let (span, entity) = self.find_reference(query, session)?;
        let mut rewritten = String::with_capacity(query.len() + entity.value.len());
        rewritten.push_str(&query[..span.0]);
        rewritten.push_str(&entity.value);
        rewritten.push_str(&query[span.1..]);
        Some((rewritten, entity))
    }

    fn find_reference(&self, query: &str, session: &Session) -> Option<((usize, usize), Entity)> {
        let m = MARKER.find(query)?;
        let marker = m.as_str().to_lowercase();
        let constraint = marker_constraint(&marker);
        let has_target_verb = TARGET_VERB.is_match(query);

        // Bare pronouns are too common to rewrite on their own; only treat
        // them as back-references when the query's verb wants a target.
        let kinds: Vec<EntityKind> = match constraint {
            Some(kind) => vec![kind],
            None if has_target_verb => vec![
                EntityKind::FilePath,
                EntityKind::DirectoryPath,
                EntityKind::Repository,
            ],
            None => return None,
        };

        let entity = session
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| kinds.contains(&e.kind))
            .max_by_key(|(index, e)| (e.last_referenced, *index))
            .map(|(_, e)| e.clone())?;

        Some(((m.start(), m.end()), entity))
    }
}

/// Kind a multi-word marker pins down; `None` for bare pronouns.
fn marker_constraint(marker: &str) -> Option<EntityKind> {
    match marker {
        "that file" | "this file" | "the file" => Some(EntityKind::FilePath),
        "that directory" | "the directory" | "that folder" | "the folder" => {
            Some(EntityKind::DirectoryPath)
        }
        "that repository" | "the repository" | "that repo" | "the repo" => {
            Some(EntityKind::Repository)
        }
        _ => None,
    }
}

/// True when the match butts up against a token it is really part of
/// (the tail of a URL, a relative segment, a word).
fn glued_to_token(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|prev| prev.is_alphanumeric() || matches!(prev, ':' | '/' | '.'))
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && s < end)
}

/// Canonical repository form: scheme and `www.` stripped, trailing
/// punctuation, slash, and `.git` removed.
fn canonical_repo(raw: &str) -> String {
    let mut value = raw.trim_end_matches(['.', ',']);
    value = value.trim_end_matches('/');
    let value = value.strip_suffix(".git").unwrap_or(value);
    let value = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    value.strip_prefix("www.").unwrap_or(value).to_string()
}

/// Classify a rooted token as file or directory and canonicalize it.
///
/// A last segment with an interior or leading dot reads as a file name;
/// anything else is a directory. Trailing slashes and sentence punctuation
/// are trimmed.
fn canonical_path(raw: &str) -> Option<(EntityKind, String)> {
    let value = raw.trim_end_matches('.').trim_end_matches('/');
    if value.is_empty() || value == "~" || value == "." {
        return None;
    }

    let last_segment = value.rsplit('/').next().unwrap_or(value);
    let kind = if last_segment.contains('.') && !last_segment.ends_with('.') {
        EntityKind::FilePath
    } else {
        EntityKind::DirectoryPath
    };

    Some((kind, value.to_string()))
}
