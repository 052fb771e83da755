//! Mapping positions (file path + line range) from one tree to another.
//!
//! A [`Mapping`] describes how one file changed between two trees: its old
//! and new path plus the line ranges that were replaced. Entities anchored
//! at a position in the old tree are moved to the corresponding position in
//! the new tree: their file path follows renames and copies, and their line
//! range is shifted by the net size change of every range mapping that lies
//! before it. Entities that overlap a replaced range, or that belong to a
//! deleted file, are handed to the [`ConflictStrategy`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use bstr::BString;
use serde::{Deserialize, Serialize};

/// Half-open line range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn shifted_by(&self, amount: isize) -> Self {
        Self::new(
            self.start.saturating_add_signed(amount),
            self.end.saturating_add_signed(amount),
        )
    }
}

/// Where an entity sits in a tree. Either part may be unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub path: Option<BString>,
    pub range: Option<Range>,
}

/// How one file's path changed. An absent old path is an addition, an absent
/// new path a deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileMapping {
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
}

/// A replaced region: `old` lines in the old tree became `new` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RangeMapping {
    pub old: Range,
    pub new: Range,
}

/// All changes of one file between two trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub file: FileMapping,
    pub ranges: Vec<RangeMapping>,
}

/// An entity together with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedEntity<T> {
    pub entity: T,
    pub position: Position,
}

impl<T> PositionedEntity<T> {
    pub fn new(entity: T, position: Position) -> Self {
        Self { entity, position }
    }

    fn at(&self, position: Position) -> Self
    where
        T: Clone,
    {
        Self {
            entity: self.entity.clone(),
            position,
        }
    }
}

/// What happens to an entity whose position cannot be mapped exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictStrategy {
    /// Drop the entity.
    Omit,
    /// Keep the entity with as much of its position as is still valid: a
    /// range conflict keeps the path without a range, a deleted file keeps
    /// neither.
    BestPosition,
}

impl ConflictStrategy {
    fn on_range_conflict(&self, old: &Position) -> Option<Position> {
        match self {
            Self::Omit => None,
            Self::BestPosition => Some(Position {
                path: old.path.clone(),
                range: None,
            }),
        }
    }

    fn on_file_conflict(&self) -> Option<Position> {
        match self {
            Self::Omit => None,
            Self::BestPosition => Some(Position {
                path: None,
                range: None,
            }),
        }
    }
}

/// Moves positioned entities through a set of mappings.
#[derive(Debug, Clone, Copy)]
pub struct PositionTransformer {
    strategy: ConflictStrategy,
}

impl PositionTransformer {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// Transform `entities`, whose positions refer to the old tree of
    /// `mappings`, into positions in the new tree. Entities of files no
    /// mapping mentions are kept unchanged.
    pub fn transform<T: Clone>(
        &self,
        entities: Vec<PositionedEntity<T>>,
        mappings: &[Mapping],
    ) -> Vec<PositionedEntity<T>> {
        let entities = self.update_file_paths(entities, mappings);
        self.shift_ranges(entities, mappings)
    }

    fn update_file_paths<T: Clone>(
        &self,
        entities: Vec<PositionedEntity<T>>,
        mappings: &[Mapping],
    ) -> Vec<PositionedEntity<T>> {
        let mut new_paths: BTreeMap<&BString, BTreeSet<&BString>> = BTreeMap::new();
        for mapping in mappings {
            if let Some(old) = &mapping.file.old_path {
                let targets = new_paths.entry(old).or_default();
                if let Some(new) = &mapping.file.new_path {
                    targets.insert(new);
                }
            }
        }

        let mut result = Vec::with_capacity(entities.len());
        for entity in entities {
            let Some(targets) = entity.position.path.as_ref().and_then(|p| new_paths.get(p)) else {
                result.push(entity);
                continue;
            };
            if targets.is_empty() {
                if let Some(position) = self.strategy.on_file_conflict() {
                    result.push(entity.at(position));
                }
                continue;
            }
            for new_path in targets {
                result.push(entity.at(Position {
                    path: Some((*new_path).clone()),
                    range: entity.position.range,
                }));
            }
        }
        result
    }

    fn shift_ranges<T: Clone>(
        &self,
        entities: Vec<PositionedEntity<T>>,
        mappings: &[Mapping],
    ) -> Vec<PositionedEntity<T>> {
        let mut ranges_by_new_path: BTreeMap<&BString, Vec<RangeMapping>> = BTreeMap::new();
        for mapping in mappings {
            if let Some(new_path) = &mapping.file.new_path {
                ranges_by_new_path
                    .entry(new_path)
                    .or_default()
                    .extend(mapping.ranges.iter().copied());
            }
        }

        let mut by_path: BTreeMap<Option<BString>, Vec<PositionedEntity<T>>> = BTreeMap::new();
        for entity in entities {
            by_path
                .entry(entity.position.path.clone())
                .or_default()
                .push(entity);
        }

        let mut result = Vec::new();
        for (path, entities) in by_path {
            let ranges = path
                .as_ref()
                .and_then(|p| ranges_by_new_path.get(p))
                .map(Vec::as_slice)
                .unwrap_or_default();
            if ranges.is_empty() {
                result.extend(entities);
            } else {
                result.extend(self.shift_in_file(entities, ranges));
            }
        }
        result
    }

    /// Sweep the entities and the range mappings of one file in order,
    /// carrying the accumulated shift forward.
    fn shift_in_file<T: Clone>(
        &self,
        mut entities: Vec<PositionedEntity<T>>,
        ranges: &[RangeMapping],
    ) -> Vec<PositionedEntity<T>> {
        entities.sort_by(|a, b| compare_ranges(a.position.range, b.position.range));
        let mut mappings = ranges.to_vec();
        mappings.sort_by_key(|m| (m.old.start, m.old.end));

        let mut result = Vec::with_capacity(entities.len());
        let mut shift: isize = 0;
        let mut next_mapping = 0;
        let mut pending = entities.into_iter();
        let mut current = pending.next();

        while let Some(entity) = current.take() {
            let Some(range) = entity.position.range else {
                result.push(entity);
                current = pending.next();
                continue;
            };
            let Some(mapping) = mappings.get(next_mapping) else {
                current = Some(entity);
                break;
            };
            if mapping.old.end <= range.start {
                shift = mapping.new.end as isize - mapping.old.end as isize;
                next_mapping += 1;
                current = Some(entity);
            } else if range.end <= mapping.old.start {
                result.push(shifted(entity, shift));
                current = pending.next();
            } else {
                if let Some(position) = self.strategy.on_range_conflict(&entity.position) {
                    result.push(entity.at(position));
                }
                current = pending.next();
            }
        }
        result.extend(current.into_iter().chain(pending).map(|e| shifted(e, shift)));
        result
    }
}

fn shifted<T>(mut entity: PositionedEntity<T>, amount: isize) -> PositionedEntity<T> {
    entity.position.range = entity.position.range.map(|r| r.shifted_by(amount));
    entity
}

/// Entities without a range first, then by start and end.
fn compare_ranges(a: Option<Range>, b: Option<Range>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => (a.start, a.end).cmp(&(b.start, b.end)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: &str, start: usize, end: usize) -> Position {
        Position {
            path: Some(BString::from(path)),
            range: Some(Range::new(start, end)),
        }
    }

    fn entity(name: &'static str, position: Position) -> PositionedEntity<&'static str> {
        PositionedEntity::new(name, position)
    }

    fn mapping(
        old: Option<&str>,
        new: Option<&str>,
        ranges: &[(usize, usize, usize, usize)],
    ) -> Mapping {
        Mapping {
            file: FileMapping {
                old_path: old.map(BString::from),
                new_path: new.map(BString::from),
            },
            ranges: ranges
                .iter()
                .map(|&(os, oe, ns, ne)| RangeMapping {
                    old: Range::new(os, oe),
                    new: Range::new(ns, ne),
                })
                .collect(),
        }
    }

    fn omit() -> PositionTransformer {
        PositionTransformer::new(ConflictStrategy::Omit)
    }

    #[test]
    fn entity_after_insertion_moves_down() {
        let out = omit().transform(
            vec![entity("c", pos("f", 10, 12))],
            &[mapping(Some("f"), Some("f"), &[(2, 2, 2, 5)])],
        );
        assert_eq!(out, vec![entity("c", pos("f", 13, 15))]);
    }

    #[test]
    fn entity_before_change_is_untouched() {
        let out = omit().transform(
            vec![entity("c", pos("f", 0, 2))],
            &[mapping(Some("f"), Some("f"), &[(5, 8, 5, 6)])],
        );
        assert_eq!(out, vec![entity("c", pos("f", 0, 2))]);
    }

    #[test]
    fn shifts_accumulate_across_mappings() {
        let out = omit().transform(
            vec![entity("a", pos("f", 4, 5)), entity("b", pos("f", 20, 21))],
            &[mapping(
                Some("f"),
                Some("f"),
                &[(1, 3, 1, 1), (10, 10, 8, 12)],
            )],
        );
        assert_eq!(
            out,
            vec![entity("a", pos("f", 2, 3)), entity("b", pos("f", 22, 23))]
        );
    }

    #[test]
    fn overlap_is_omitted_or_loses_range() {
        let mappings = [mapping(Some("f"), Some("f"), &[(3, 6, 3, 4)])];
        let entities = vec![entity("c", pos("f", 5, 7))];
        assert!(omit().transform(entities.clone(), &mappings).is_empty());

        let best = PositionTransformer::new(ConflictStrategy::BestPosition)
            .transform(entities, &mappings);
        assert_eq!(
            best,
            vec![entity(
                "c",
                Position {
                    path: Some(BString::from("f")),
                    range: None
                }
            )]
        );
    }

    #[test]
    fn rename_moves_path_and_range() {
        let out = omit().transform(
            vec![entity("c", pos("old.rs", 4, 6))],
            &[mapping(Some("old.rs"), Some("new.rs"), &[(0, 0, 0, 1)])],
        );
        assert_eq!(out, vec![entity("c", pos("new.rs", 5, 7))]);
    }

    #[test]
    fn copy_duplicates_entity() {
        let out = omit().transform(
            vec![entity("c", pos("src", 1, 2))],
            &[
                mapping(Some("src"), Some("src"), &[]),
                mapping(Some("src"), Some("copy"), &[]),
            ],
        );
        assert_eq!(
            out,
            vec![entity("c", pos("copy", 1, 2)), entity("c", pos("src", 1, 2))]
        );
    }

    #[test]
    fn deleted_file_conflicts() {
        let mappings = [mapping(Some("gone"), None, &[(0, 3, 0, 0)])];
        let entities = vec![entity("c", pos("gone", 1, 2))];
        assert!(omit().transform(entities.clone(), &mappings).is_empty());
        let best = PositionTransformer::new(ConflictStrategy::BestPosition)
            .transform(entities, &mappings);
        assert_eq!(
            best,
            vec![entity(
                "c",
                Position {
                    path: None,
                    range: None
                }
            )]
        );
    }

    #[test]
    fn unmapped_files_and_rangeless_entities_are_kept() {
        let no_range = entity(
            "file-level",
            Position {
                path: Some(BString::from("f")),
                range: None,
            },
        );
        let out = omit().transform(
            vec![no_range.clone(), entity("other", pos("g", 1, 2))],
            &[mapping(Some("f"), Some("f"), &[(0, 1, 0, 2)])],
        );
        assert_eq!(out, vec![no_range, entity("other", pos("g", 1, 2))]);
    }
}
