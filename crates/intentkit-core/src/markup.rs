//! Inline entity markup: `book a flight to {boston|city}`.
//!
//! [`dump_query`] renders a labeled example for human-readable dumps (the
//! `raw` mode of the query tree). [`load_query`] parses the same format back,
//! which is how the project loader reads its labeled query files.

use thiserror::Error;

use crate::query::{Entity, ProcessedQuery};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unbalanced '{{' at char {0}")]
    UnclosedBrace(usize),

    #[error("unexpected '}}' at char {0}")]
    UnexpectedClose(usize),

    #[error("entity at char {0} has no '|type' part")]
    MissingType(usize),
}

/// Render a labeled example as markup. Entities that overlap an earlier one or
/// fall outside the text are skipped.
pub fn dump_query(query: &ProcessedQuery) -> String {
    let chars: Vec<char> = query.query.text.chars().collect();
    let mut entities: Vec<&Entity> = query.entities.iter().collect();
    entities.sort_by_key(|e| (e.start, e.end));

    let mut out = String::with_capacity(chars.len() + entities.len() * 8);
    let mut cursor = 0;
    for entity in entities {
        if entity.start < cursor || entity.end > chars.len() || entity.start >= entity.end {
            continue;
        }
        out.extend(&chars[cursor..entity.start]);
        out.push('{');
        out.extend(&chars[entity.start..entity.end]);
        out.push('|');
        out.push_str(&entity.entity_type);
        out.push('}');
        cursor = entity.end;
    }
    out.extend(&chars[cursor..]);
    out
}

/// Parse markup into a labeled example.
pub fn load_query(markup: &str, domain: &str, intent: &str) -> Result<ProcessedQuery, MarkupError> {
    let mut text = String::with_capacity(markup.len());
    let mut entities = Vec::new();
    // (open position in markup, start char in text, type separator seen)
    let mut open: Option<(usize, usize, Option<String>)> = None;
    let mut text_len = 0;

    for (pos, c) in markup.chars().enumerate() {
        match (c, open.as_mut()) {
            ('{', None) => open = Some((pos, text_len, None)),
            ('{', Some(_)) => {
                let (start, _, _) = open.take().unwrap_or_default();
                return Err(MarkupError::UnclosedBrace(start));
            }
            ('|', Some((_, _, entity_type @ None))) => *entity_type = Some(String::new()),
            ('}', None) => return Err(MarkupError::UnexpectedClose(pos)),
            ('}', Some(_)) => {
                let (start_pos, start, entity_type) = open.take().unwrap_or_default();
                let entity_type = entity_type.ok_or(MarkupError::MissingType(start_pos))?;
                entities.push(Entity {
                    start,
                    end: text_len,
                    entity_type: entity_type.trim().to_string(),
                });
            }
            (c, Some((_, _, Some(entity_type)))) => entity_type.push(c),
            (c, _) => {
                text.push(c);
                text_len += 1;
            }
        }
    }

    if let Some((start, _, _)) = open {
        return Err(MarkupError::UnclosedBrace(start));
    }

    Ok(ProcessedQuery::new(text, domain, intent).with_entities(entities))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(start: usize, end: usize) -> Entity {
        Entity {
            start,
            end,
            entity_type: "city".into(),
        }
    }

    #[test]
    fn dump_without_entities_is_text() {
        let q = ProcessedQuery::new("play jazz", "music", "play");
        assert_eq!(dump_query(&q), "play jazz");
    }

    #[test]
    fn dump_renders_entities_inline() {
        let q = ProcessedQuery::new("fly to boston now", "travel", "book")
            .with_entities(vec![city(7, 13)]);
        assert_eq!(dump_query(&q), "fly to {boston|city} now");
    }

    #[test]
    fn dump_skips_overlapping_and_out_of_range() {
        let q = ProcessedQuery::new("fly to boston", "travel", "book")
            .with_entities(vec![city(7, 13), city(8, 10), city(10, 40)]);
        assert_eq!(dump_query(&q), "fly to {boston|city}");
    }

    #[test]
    fn load_parses_entities() {
        let q = load_query("fly to {new york|city} today", "travel", "book").unwrap();
        assert_eq!(q.text(), "fly to new york today");
        assert_eq!(q.entities, vec![city(7, 15)]);
        assert_eq!(q.domain, "travel");
        assert_eq!(q.intent, "book");
    }

    #[test]
    fn load_then_dump_is_stable() {
        let markup = "{play|verb} some {jazz|genre}";
        let q = load_query(markup, "music", "play").unwrap();
        assert_eq!(dump_query(&q), markup);
    }

    #[test]
    fn load_rejects_bad_markup() {
        assert_eq!(
            load_query("fly to {boston", "d", "i").unwrap_err(),
            MarkupError::UnclosedBrace(7)
        );
        assert_eq!(
            load_query("fly to boston}", "d", "i").unwrap_err(),
            MarkupError::UnexpectedClose(13)
        );
        assert_eq!(
            load_query("fly to {boston}", "d", "i").unwrap_err(),
            MarkupError::MissingType(7)
        );
    }
}
