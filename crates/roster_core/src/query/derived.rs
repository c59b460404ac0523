//! Query derivation from repository method names.
//!
//! # Responsibility
//! - Parse `<prefix><subject>By<predicate>[OrderBy<orders>]` into a
//!   `PartTree` whose properties are resolved against `EntityMeta`.
//!
//! # Invariants
//! - Keywords (`And`, `Or`, `OrderBy`, operator suffixes) are matched on whole
//!   camel-case words, so property names merely containing them are safe.
//! - Every property in a parsed tree exists in the mapping.

use super::page::{Direction, Order, Sort};
use super::QueryError;
use crate::model::meta::{EntityMeta, PropertyPath};
use once_cell::sync::Lazy;
use regex::Regex;

static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists|delete|remove)(\p{Lu}\w*?)??By(.*)$")
        .expect("valid method prefix regex")
});
static LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Top|First)(\d*)$").expect("valid subject limit regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Select,
    Count,
    Exists,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub kind: SubjectKind,
    pub distinct: bool,
    /// From `Top<N>`/`First<N>`; a bare `Top`/`First` means 1.
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    IsNull,
    IsNotNull,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    In,
    NotIn,
    True,
    False,
}

impl Operator {
    /// Number of call arguments the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull | Self::True | Self::False => 0,
            Self::Between => 2,
            _ => 1,
        }
    }
}

const OPERATOR_KEYWORDS: &[(&[&str], Operator)] = &[
    (&["Is", "Not", "Null"], Operator::IsNotNull),
    (&["Not", "Null"], Operator::IsNotNull),
    (&["Is", "Null"], Operator::IsNull),
    (&["Null"], Operator::IsNull),
    (&["Is", "Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Is", "Less", "Than"], Operator::LessThan),
    (&["Less", "Than"], Operator::LessThan),
    (&["Is", "Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Is", "Greater", "Than"], Operator::GreaterThan),
    (&["Greater", "Than"], Operator::GreaterThan),
    (&["Is", "Before"], Operator::LessThan),
    (&["Before"], Operator::LessThan),
    (&["Is", "After"], Operator::GreaterThan),
    (&["After"], Operator::GreaterThan),
    (&["Is", "Between"], Operator::Between),
    (&["Between"], Operator::Between),
    (&["Is", "Not", "Like"], Operator::NotLike),
    (&["Not", "Like"], Operator::NotLike),
    (&["Is", "Like"], Operator::Like),
    (&["Like"], Operator::Like),
    (&["Is", "Starting", "With"], Operator::StartingWith),
    (&["Starting", "With"], Operator::StartingWith),
    (&["Starts", "With"], Operator::StartingWith),
    (&["Is", "Ending", "With"], Operator::EndingWith),
    (&["Ending", "With"], Operator::EndingWith),
    (&["Ends", "With"], Operator::EndingWith),
    (&["Is", "Containing"], Operator::Containing),
    (&["Containing"], Operator::Containing),
    (&["Contains"], Operator::Containing),
    (&["Is", "Not", "In"], Operator::NotIn),
    (&["Not", "In"], Operator::NotIn),
    (&["Is", "In"], Operator::In),
    (&["In"], Operator::In),
    (&["Is", "True"], Operator::True),
    (&["True"], Operator::True),
    (&["Is", "False"], Operator::False),
    (&["False"], Operator::False),
    (&["Is", "Not"], Operator::NotEquals),
    (&["Not"], Operator::NotEquals),
    (&["Is"], Operator::Equals),
    (&["Equals"], Operator::Equals),
];

/// One comparison on one property.
#[derive(Debug, Clone)]
pub struct Part {
    pub property: PropertyPath,
    pub operator: Operator,
    pub ignore_case: bool,
}

/// Parsed method name.
///
/// `predicate` is a disjunction of conjunctions; an empty predicate selects
/// every row.
#[derive(Debug, Clone)]
pub struct PartTree {
    pub subject: Subject,
    pub predicate: Vec<Vec<Part>>,
    pub order_by: Sort,
}

impl PartTree {
    pub fn parse(method: &str, meta: &'static EntityMeta) -> Result<Self, QueryError> {
        let invalid = || QueryError::InvalidMethodName(method.to_string());
        let captures = PREFIX_RE.captures(method).ok_or_else(invalid)?;

        let kind = match &captures[1] {
            "count" => SubjectKind::Count,
            "exists" => SubjectKind::Exists,
            "delete" | "remove" => SubjectKind::Delete,
            _ => SubjectKind::Select,
        };
        let subject = parse_subject(
            kind,
            captures.get(2).map_or("", |subject| subject.as_str()),
        )?;

        let words = camel_words(captures.get(3).map_or("", |rest| rest.as_str()));
        let (predicate_words, order_words) = match words
            .windows(2)
            .position(|pair| pair[0] == "Order" && pair[1] == "By")
        {
            Some(index) => (&words[..index], Some(&words[index + 2..])),
            None => (&words[..], None),
        };

        let predicate = parse_predicate(method, predicate_words, meta)?;
        let order_by = match order_words {
            Some(words) if words.is_empty() => return Err(invalid()),
            Some(words) => parse_order_by(words, meta)?,
            None => Sort::unsorted(),
        };

        Ok(Self {
            subject,
            predicate,
            order_by,
        })
    }

    /// Total number of call arguments the predicate consumes.
    pub fn expected_arguments(&self) -> usize {
        self.parts().map(|part| part.operator.arity()).sum()
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.predicate.iter().flatten()
    }
}

fn parse_subject(kind: SubjectKind, source: &str) -> Result<Subject, QueryError> {
    let mut subject = Subject {
        kind,
        distinct: false,
        limit: None,
    };
    for word in camel_words(source) {
        if word == "Distinct" {
            subject.distinct = true;
        } else if let Some(captures) = LIMIT_RE.captures(word) {
            let digits = &captures[1];
            let limit = if digits.is_empty() {
                1
            } else {
                digits
                    .parse::<u32>()
                    .map_err(|_| QueryError::InvalidMethodName(source.to_string()))?
            };
            subject.limit = Some(limit);
        }
    }
    Ok(subject)
}

fn parse_predicate(
    method: &str,
    words: &[&str],
    meta: &'static EntityMeta,
) -> Result<Vec<Vec<Part>>, QueryError> {
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let (words, all_ignore_case) = match strip_suffix(words, &["All", "Ignore", "Case"])
        .or_else(|| strip_suffix(words, &["All", "Ignoring", "Case"]))
    {
        Some(rest) => (rest, true),
        None => (words, false),
    };

    let mut predicate = Vec::new();
    for or_group in words.split(|word| *word == "Or") {
        let mut conjunction = Vec::new();
        for part_words in or_group.split(|word| *word == "And") {
            if part_words.is_empty() {
                return Err(QueryError::InvalidMethodName(method.to_string()));
            }
            let mut part = parse_part(part_words, meta)?;
            part.ignore_case |= all_ignore_case;
            conjunction.push(part);
        }
        predicate.push(conjunction);
    }
    Ok(predicate)
}

fn parse_part(words: &[&str], meta: &'static EntityMeta) -> Result<Part, QueryError> {
    let (words, ignore_case) = match strip_suffix(words, &["Ignore", "Case"])
        .or_else(|| strip_suffix(words, &["Ignoring", "Case"]))
    {
        Some(rest) => (rest, true),
        None => (words, false),
    };

    let mut keywords = OPERATOR_KEYWORDS.to_vec();
    keywords.sort_by_key(|(keyword, _)| std::cmp::Reverse(keyword.len()));

    let (property_words, operator) = keywords
        .iter()
        .find_map(|(keyword, operator)| {
            strip_suffix(words, keyword)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest, *operator))
        })
        .unwrap_or((words, Operator::Equals));

    Ok(Part {
        property: resolve_property(property_words, meta)?,
        operator,
        ignore_case,
    })
}

fn parse_order_by(words: &[&str], meta: &'static EntityMeta) -> Result<Sort, QueryError> {
    let mut orders = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for word in words {
        let direction = match *word {
            "Asc" => Some(Direction::Asc),
            "Desc" => Some(Direction::Desc),
            _ => None,
        };
        match direction {
            Some(direction) if !pending.is_empty() => {
                let property = resolve_property(&pending, meta)?;
                orders.push(Order {
                    property: property.dotted(),
                    direction,
                });
                pending.clear();
            }
            _ => pending.push(word),
        }
    }
    if !pending.is_empty() {
        let property = resolve_property(&pending, meta)?;
        orders.push(Order::asc(property.dotted()));
    }
    Ok(Sort::from_orders(orders))
}

/// Resolves camel-case words to a property path.
///
/// `Team_Name` splits explicitly; otherwise the whole name is tried first,
/// then every split point as `<association>.<field>`.
fn resolve_property(
    words: &[&str],
    meta: &'static EntityMeta,
) -> Result<PropertyPath, QueryError> {
    let unknown = |property: String| QueryError::UnknownProperty {
        entity: meta.name,
        property,
    };

    if let Some(index) = words.iter().position(|word| *word == "_") {
        let dotted = format!(
            "{}.{}",
            uncapitalize(&words[..index].concat()),
            uncapitalize(&words[index + 1..].concat())
        );
        return meta.resolve_path(&dotted).ok_or_else(|| unknown(dotted));
    }

    let whole = uncapitalize(&words.concat());
    if let Some(path) = meta.resolve_path(&whole) {
        return Ok(path);
    }
    for split in 1..words.len() {
        let dotted = format!(
            "{}.{}",
            uncapitalize(&words[..split].concat()),
            uncapitalize(&words[split..].concat())
        );
        if let Some(path) = meta.resolve_path(&dotted) {
            return Ok(path);
        }
    }
    Err(unknown(whole))
}

fn strip_suffix<'a, 'w>(words: &'a [&'w str], suffix: &[&str]) -> Option<&'a [&'w str]> {
    if words.len() < suffix.len() {
        return None;
    }
    let (rest, tail) = words.split_at(words.len() - suffix.len());
    (tail == suffix).then_some(rest)
}

/// Splits before every uppercase letter; `_` becomes a word of its own.
/// Digits stay attached to the preceding word (`Top3`).
fn camel_words(source: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    for (index, ch) in source.char_indices() {
        if ch == '_' {
            if start < index {
                words.push(&source[start..index]);
            }
            words.push("_");
            start = index + ch.len_utf8();
        } else if ch.is_uppercase() && index > start {
            words.push(&source[start..index]);
            start = index;
        }
    }
    if start < source.len() {
        words.push(&source[start..]);
    }
    words
}

fn uncapitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{camel_words, Operator, PartTree, SubjectKind};
    use crate::model::member::MEMBER_META;
    use crate::query::page::Direction;
    use crate::query::QueryError;

    #[test]
    fn camel_words_split_on_case_and_underscore() {
        assert_eq!(
            camel_words("UsernameAndAgeGreaterThan"),
            vec!["Username", "And", "Age", "Greater", "Than"]
        );
        assert_eq!(camel_words("Top3Hello"), vec!["Top3", "Hello"]);
        assert_eq!(camel_words("Team_Name"), vec!["Team", "_", "Name"]);
    }

    #[test]
    fn parses_conjunction_with_comparison_suffix() {
        let tree = PartTree::parse("findByUsernameAndAgeGreaterThan", &MEMBER_META).unwrap();

        assert_eq!(tree.subject.kind, SubjectKind::Select);
        assert_eq!(tree.predicate.len(), 1);
        let parts = &tree.predicate[0];
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].property.dotted(), "username");
        assert_eq!(parts[0].operator, Operator::Equals);
        assert_eq!(parts[1].property.dotted(), "age");
        assert_eq!(parts[1].operator, Operator::GreaterThan);
        assert_eq!(tree.expected_arguments(), 2);
    }

    #[test]
    fn top_n_subject_with_empty_predicate() {
        let tree = PartTree::parse("findTop3HelloBy", &MEMBER_META).unwrap();
        assert_eq!(tree.subject.limit, Some(3));
        assert!(tree.predicate.is_empty());
        assert_eq!(tree.expected_arguments(), 0);

        let first = PartTree::parse("findFirstByAge", &MEMBER_META).unwrap();
        assert_eq!(first.subject.limit, Some(1));
    }

    #[test]
    fn distinct_count_exists_and_delete_prefixes() {
        let tree = PartTree::parse("findDistinctByUsername", &MEMBER_META).unwrap();
        assert!(tree.subject.distinct);

        let count = PartTree::parse("countByAge", &MEMBER_META).unwrap();
        assert_eq!(count.subject.kind, SubjectKind::Count);

        let exists = PartTree::parse("existsByUsername", &MEMBER_META).unwrap();
        assert_eq!(exists.subject.kind, SubjectKind::Exists);

        let delete = PartTree::parse("removeByAgeLessThan", &MEMBER_META).unwrap();
        assert_eq!(delete.subject.kind, SubjectKind::Delete);
    }

    #[test]
    fn or_groups_and_ignore_case() {
        let tree =
            PartTree::parse("findByUsernameIgnoreCaseOrAgeBetween", &MEMBER_META).unwrap();
        assert_eq!(tree.predicate.len(), 2);
        assert!(tree.predicate[0][0].ignore_case);
        assert_eq!(tree.predicate[1][0].operator, Operator::Between);
        assert_eq!(tree.expected_arguments(), 3);

        let all = PartTree::parse("findByUsernameAndTeamNameAllIgnoreCase", &MEMBER_META).unwrap();
        assert!(all.parts().all(|part| part.ignore_case));
    }

    #[test]
    fn nested_property_through_association() {
        let implicit = PartTree::parse("findByTeamName", &MEMBER_META).unwrap();
        assert_eq!(implicit.predicate[0][0].property.dotted(), "team.name");

        let explicit = PartTree::parse("findByTeam_Name", &MEMBER_META).unwrap();
        assert_eq!(explicit.predicate[0][0].property.dotted(), "team.name");

        let association = PartTree::parse("findByTeamIsNull", &MEMBER_META).unwrap();
        assert_eq!(association.predicate[0][0].property.dotted(), "team");
        assert_eq!(association.predicate[0][0].operator, Operator::IsNull);
    }

    #[test]
    fn order_by_clause_with_directions() {
        let tree = PartTree::parse("findByAgeOrderByUsernameDescIdAsc", &MEMBER_META).unwrap();
        let orders = tree.order_by.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].property, "username");
        assert_eq!(orders[0].direction, Direction::Desc);
        assert_eq!(orders[1].property, "id");

        let implicit = PartTree::parse("findByAgeOrderByUsername", &MEMBER_META).unwrap();
        assert_eq!(implicit.order_by.orders()[0].direction, Direction::Asc);
    }

    #[test]
    fn longest_operator_suffix_wins() {
        let tree = PartTree::parse("findByAgeGreaterThanEqual", &MEMBER_META).unwrap();
        assert_eq!(tree.predicate[0][0].operator, Operator::GreaterThanEqual);

        let tree = PartTree::parse("findByUsernameIsNotNull", &MEMBER_META).unwrap();
        assert_eq!(tree.predicate[0][0].operator, Operator::IsNotNull);

        let tree = PartTree::parse("findByUsernameNotIn", &MEMBER_META).unwrap();
        assert_eq!(tree.predicate[0][0].operator, Operator::NotIn);
    }

    #[test]
    fn rejects_unknown_property_and_malformed_names() {
        let err = PartTree::parse("findByNickname", &MEMBER_META).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownProperty {
                entity: "Member",
                property: "nickname".to_string()
            }
        );

        assert!(matches!(
            PartTree::parse("lookupUsername", &MEMBER_META),
            Err(QueryError::InvalidMethodName(_))
        ));
        assert!(matches!(
            PartTree::parse("findByUsernameAndAndAge", &MEMBER_META),
            Err(QueryError::InvalidMethodName(_))
        ));
        assert!(matches!(
            PartTree::parse("findByAgeOrderBy", &MEMBER_META),
            Err(QueryError::InvalidMethodName(_))
        ));
    }
}
