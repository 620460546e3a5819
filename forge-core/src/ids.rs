//! Loop ID generation and reference resolution.
//!
//! A loop's `id` is a v7 UUID rendered without hyphens; `short_id` is a
//! deterministic 8-character prefix of `id`. Resolution order follows the
//! Store contract: exact `short_id` (case-insensitive) -> exact `id` ->
//! exact `name` -> unique prefix of `short_id` -> unique prefix of `id`.

use uuid::Uuid;

pub const SHORT_ID_LEN: usize = 8;

/// Generate a new loop id (v7 UUID, hyphens stripped) and its short_id.
pub fn generate_loop_id() -> (String, String) {
    let id = Uuid::now_v7().simple().to_string();
    let short_id = id[..SHORT_ID_LEN].to_string();
    (id, short_id)
}

/// Turn a human title into a name-safe slug, stripping apostrophes and
/// collapsing runs of other non-alphanumeric characters to a single hyphen.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// A minimal view of a loop used purely for reference resolution, so the
/// resolver doesn't need the full `Loop` record shape.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    pub id: String,
    pub short_id: String,
    pub name: String,
}

/// Outcome of resolving a user-supplied reference against a universe of loops.
pub enum Resolution {
    Found(String),
    NotFound,
    Ambiguous(Vec<String>),
}

/// Resolve `reference` against `universe` following the Store's documented order.
pub fn resolve_loop_ref(universe: &[LoopHandle], reference: &str) -> Resolution {
    let reference_lower = reference.to_lowercase();

    if let Some(h) = universe
        .iter()
        .find(|h| h.short_id.to_lowercase() == reference_lower)
    {
        return Resolution::Found(h.id.clone());
    }
    if let Some(h) = universe.iter().find(|h| h.id == reference) {
        return Resolution::Found(h.id.clone());
    }
    if let Some(h) = universe.iter().find(|h| h.name == reference) {
        return Resolution::Found(h.id.clone());
    }

    let short_prefix_matches: Vec<&LoopHandle> = universe
        .iter()
        .filter(|h| h.short_id.to_lowercase().starts_with(&reference_lower))
        .collect();
    match short_prefix_matches.len() {
        1 => return Resolution::Found(short_prefix_matches[0].id.clone()),
        n if n > 1 => {
            return Resolution::Ambiguous(
                short_prefix_matches.iter().map(|h| h.name.clone()).collect(),
            );
        }
        _ => {}
    }

    let id_prefix_matches: Vec<&LoopHandle> =
        universe.iter().filter(|h| h.id.starts_with(reference)).collect();
    match id_prefix_matches.len() {
        1 => Resolution::Found(id_prefix_matches[0].id.clone()),
        n if n > 1 => {
            Resolution::Ambiguous(id_prefix_matches.iter().map(|h| h.name.clone()).collect())
        }
        _ => Resolution::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str, short: &str, name: &str) -> LoopHandle {
        LoopHandle {
            id: id.into(),
            short_id: short.into(),
            name: name.into(),
        }
    }

    #[test]
    fn slugify_strips_apostrophes_and_collapses_runs() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("don't stop"), "dont-stop");
        assert_eq!(slugify("Multiple   Spaces!!"), "multiple-spaces");
    }

    #[test]
    fn generate_loop_id_short_id_is_prefix() {
        let (id, short_id) = generate_loop_id();
        assert_eq!(short_id.len(), SHORT_ID_LEN);
        assert!(id.starts_with(&short_id));
    }

    #[test]
    fn resolve_exact_name_wins_over_prefix() {
        let universe = vec![
            handle("aaaaaaaa1111", "aaaaaaaa", "oracle-main"),
            handle("aaaaaaaa2222", "aaaaaaaa", "oracle-aux"),
        ];
        // short_id collides on purpose; exact name disambiguates first.
        match resolve_loop_ref(&universe, "oracle-main") {
            Resolution::Found(id) => assert_eq!(id, "aaaaaaaa1111"),
            _ => panic!("expected exact name match"),
        }
    }

    #[test]
    fn resolve_ambiguous_short_id_prefix() {
        let universe = vec![
            handle("ab111111xxxx", "ab111111", "one"),
            handle("ab222222xxxx", "ab222222", "two"),
        ];
        match resolve_loop_ref(&universe, "ab") {
            Resolution::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            _ => panic!("expected ambiguous"),
        }
    }

    #[test]
    fn resolve_not_found_on_empty_universe() {
        let universe: Vec<LoopHandle> = vec![];
        assert!(matches!(resolve_loop_ref(&universe, "x"), Resolution::NotFound));
    }

    #[test]
    fn resolve_unique_short_id_prefix() {
        let universe = vec![handle("ab111111xxxx", "ab111111", "one")];
        match resolve_loop_ref(&universe, "ab1") {
            Resolution::Found(id) => assert_eq!(id, "ab111111xxxx"),
            _ => panic!("expected unique prefix match"),
        }
    }
}
