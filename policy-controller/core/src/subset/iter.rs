use super::{Subset, Tag};
use std::iter::FusedIterator;

/// Enumerates a partition of the assignment space induced by a list of candidate tags.
///
/// Cells are visited in the order of a binary counter over the tags' negation flags, with the
/// first tag as the least significant bit. The all-positive combination is the counter's starting
/// point and is yielded last, when the counter wraps.
///
/// Tags sharing a key are collapsed: a single positive tag stands for the whole group, a group
/// with no positive tags keeps all of its negations, and a group with several positive tags can't
/// be satisfied by any assignment. Those combinations are never visited, so a key with `m`
/// candidate values contributes `m + 1` states rather than `2^m`. The yielded cells are mutually
/// exclusive and cover every assignment over the candidate keys.
///
/// Tags are grouped by key in the order each key first appears. Candidates are expected to be
/// deduplicated; sorting them makes the enumeration order stable.
#[derive(Clone, Debug)]
pub struct SubsetIter {
    groups: Vec<Vec<Tag>>,

    /// For each group, `i < len` selects the tag at `len - 1 - i` as the positive one and
    /// `i == len` negates the whole group. This matches the group's counter order.
    states: Vec<usize>,

    /// The counter starts at the all-positive combination, which is only satisfiable when no key
    /// has several candidates.
    wraps_last: bool,
    started: bool,
    finished: bool,
}

// === impl SubsetIter ===

impl SubsetIter {
    pub fn new(tags: impl IntoIterator<Item = Tag>) -> Self {
        let mut groups = Vec::<Vec<Tag>>::new();
        for tag in tags {
            let tag = Tag { not: false, ..tag };
            match groups.iter_mut().find(|group| group[0].key == tag.key) {
                Some(group) => group.push(tag),
                None => groups.push(vec![tag]),
            }
        }

        Self {
            states: vec![0; groups.len()],
            wraps_last: groups.iter().all(|group| group.len() == 1),
            groups,
            started: false,
            finished: false,
        }
    }

    /// The number of sign combinations that are skipped because they pin a key to several
    /// values. Saturates at `usize::MAX`.
    pub fn contradictions(&self) -> usize {
        let tags = self.groups.iter().map(Vec::len).sum::<usize>();
        let combinations = match u32::try_from(tags).ok().and_then(|n| 1usize.checked_shl(n)) {
            Some(combinations) => combinations,
            None => return usize::MAX,
        };
        let cells = self
            .groups
            .iter()
            .map(|group| group.len() + 1)
            .product::<usize>();
        combinations - cells
    }

    /// Advances to the next satisfiable combination, returning false once the states wrap back to
    /// their start.
    fn advance(&mut self) -> bool {
        for (state, group) in self.states.iter_mut().zip(&self.groups) {
            if *state < group.len() {
                *state += 1;
                return true;
            }
            *state = 0;
        }
        false
    }

    fn current(&self) -> Subset {
        let mut out = Vec::with_capacity(self.groups.len());
        for (state, group) in self.states.iter().zip(&self.groups) {
            match group.len().checked_sub(state + 1) {
                Some(positive) => out.push(group[positive].clone()),
                None => out.extend(group.iter().map(|tag| Tag {
                    not: true,
                    ..tag.clone()
                })),
            }
        }
        Subset(out)
    }
}

impl Iterator for SubsetIter {
    type Item = Subset;

    fn next(&mut self) -> Option<Subset> {
        if self.finished {
            return None;
        }

        if !self.started {
            self.started = true;
            if !self.wraps_last {
                return Some(self.current());
            }
        }

        if self.advance() {
            return Some(self.current());
        }

        self.finished = true;
        if self.wraps_last {
            Some(self.current())
        } else {
            None
        }
    }
}

impl FusedIterator for SubsetIter {}
