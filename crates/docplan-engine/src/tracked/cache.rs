use std::rc::Rc;

use log::debug;

use crate::index::BlockIndex;
use crate::model::Snapshot;
use crate::tracked::{GroupedTrackedChange, group_tracked_changes};

/// Grouped tracked changes for the most recently seen snapshot generation.
#[derive(Debug, Default)]
pub struct TrackedChangeCache {
    slot: Option<(u64, Rc<Vec<GroupedTrackedChange>>)>,
    builds: usize,
}

impl TrackedChangeCache {
    pub fn get(&mut self, snapshot: &Snapshot, blocks: &BlockIndex) -> Rc<Vec<GroupedTrackedChange>> {
        if let Some((generation, changes)) = &self.slot
            && *generation == snapshot.generation()
        {
            return Rc::clone(changes);
        }
        debug!("grouping tracked changes for generation {}", snapshot.generation());
        let changes = Rc::new(group_tracked_changes(snapshot, blocks));
        self.slot = Some((snapshot.generation(), Rc::clone(&changes)));
        self.builds += 1;
        changes
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockNode, Inline, MarkSet, TrackedKind, TrackedMark};
    use std::sync::Arc;

    fn snapshot(generation: u64) -> Snapshot {
        let marks = MarkSet {
            tracked: vec![TrackedMark {
                kind: TrackedKind::Insert,
                id: "r1".into(),
                author: "Ada".into(),
                author_email: None,
                date: "2024-01-01T00:00:00Z".into(),
                before: None,
            }],
            ..MarkSet::default()
        };
        Snapshot::new(
            generation,
            Arc::new(vec![BlockNode::paragraph("p1", vec![Inline::styled("new", marks)])]),
        )
    }

    #[test]
    fn test_same_generation_is_a_cache_hit() {
        let snap = snapshot(1);
        let blocks = BlockIndex::build(&snap);
        let mut cache = TrackedChangeCache::default();

        let first = cache.get(&snap, &blocks);
        let second = cache.get(&snap, &blocks);

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.builds(), 1);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_new_generation_regroups() {
        let mut cache = TrackedChangeCache::default();
        let one = snapshot(1);
        let two = snapshot(2);
        cache.get(&one, &BlockIndex::build(&one));
        cache.get(&two, &BlockIndex::build(&two));
        assert_eq!(cache.builds(), 2);

        cache.invalidate();
        cache.get(&two, &BlockIndex::build(&two));
        assert_eq!(cache.builds(), 3);
    }
}
