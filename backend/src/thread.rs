//! Read-time assembly of flat reply rows into two-level comment threads.

use std::collections::{HashMap, HashSet};

use contenthub_shared::comment_store::CommentRecord;

/// Replies grouped under their effective top-level ancestor, plus the number
/// of candidates that resolved to no listed thread.
pub struct ThreadAssembly {
    pub replies_by_root: HashMap<i64, Vec<CommentRecord>>,
    pub orphan_count: usize,
}

/// Groups candidate replies under the top-level ids of the current page.
///
/// The stored root pointer is never trusted: legacy rows may carry a missing
/// or stale `root_id`. The effective root is the stored `root_id` when it
/// points into the page, otherwise the `parent_id` when that does — which is
/// also how inconsistent rows self-heal in every rendered view. Candidates
/// matching neither are dropped (counted, never an error). Storage is not
/// touched; the repair exists only in the returned grouping.
///
/// Candidates keep their input order inside each group, so callers that pass
/// rows ordered by `(created_at, id)` get ordered threads back.
pub fn assemble_threads(top_ids: &[i64], candidates: Vec<CommentRecord>) -> ThreadAssembly {
    let top_set: HashSet<i64> = top_ids.iter().copied().collect();
    let mut replies_by_root: HashMap<i64, Vec<CommentRecord>> = HashMap::new();
    let mut orphan_count = 0usize;

    for candidate in candidates {
        let effective_root = match (candidate.root_id, candidate.parent_id) {
            (Some(root), _) if top_set.contains(&root) => root,
            (_, Some(parent)) if top_set.contains(&parent) => {
                tracing::warn!(
                    comment_id = candidate.id,
                    stored_root = ?candidate.root_id,
                    parent_id = parent,
                    "repaired reply root pointer at read time"
                );
                parent
            }
            _ => {
                orphan_count += 1;
                tracing::warn!(
                    comment_id = candidate.id,
                    stored_root = ?candidate.root_id,
                    parent_id = ?candidate.parent_id,
                    "reply resolves to no listed thread, dropping"
                );
                continue;
            }
        };

        replies_by_root
            .entry(effective_root)
            .or_default()
            .push(candidate);
    }

    ThreadAssembly {
        replies_by_root,
        orphan_count,
    }
}

#[cfg(test)]
mod tests {
    use contenthub_shared::comment_store::{CommentRecord, CommentStatus};

    use super::assemble_threads;

    fn reply(id: i64, parent_id: i64, root_id: Option<i64>) -> CommentRecord {
        CommentRecord {
            id,
            article_id: 1,
            author_id: 1,
            parent_id: Some(parent_id),
            root_id,
            content: format!("reply {id}"),
            like_count: 0,
            status: CommentStatus::Normal,
            created_at: id * 100,
            updated_at: id * 100,
        }
    }

    #[test]
    fn trusted_root_pointer_wins() {
        let assembly = assemble_threads(&[10, 20], vec![reply(31, 11, Some(10))]);
        let ids: Vec<i64> = assembly.replies_by_root[&10].iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![31]);
        assert_eq!(assembly.orphan_count, 0);
    }

    #[test]
    fn missing_root_repairs_to_parent() {
        // Repair law: parent_id in the page, root_id absent.
        let assembly = assemble_threads(&[10], vec![reply(31, 10, None)]);
        assert_eq!(assembly.replies_by_root[&10].len(), 1);
    }

    #[test]
    fn stale_root_repairs_to_parent() {
        // Repair law: root_id points outside the page, parent_id inside.
        let assembly = assemble_threads(&[10], vec![reply(31, 10, Some(999))]);
        assert_eq!(assembly.replies_by_root[&10].len(), 1);
        assert_eq!(assembly.orphan_count, 0);
    }

    #[test]
    fn orphans_are_dropped_and_counted() {
        let assembly = assemble_threads(&[10], vec![reply(31, 555, Some(999)), reply(32, 10, None)]);
        assert_eq!(assembly.orphan_count, 1);
        let grouped: usize = assembly.replies_by_root.values().map(Vec::len).sum();
        assert_eq!(grouped, 1);
    }

    #[test]
    fn groups_partition_candidates_without_leakage() {
        let candidates = vec![
            reply(31, 10, Some(10)),
            reply(32, 20, None),
            reply(33, 31, Some(10)), // grandchild keyed by its root
            reply(34, 20, Some(20)),
        ];
        let assembly = assemble_threads(&[10, 20], candidates);

        let group10: Vec<i64> = assembly.replies_by_root[&10].iter().map(|r| r.id).collect();
        let group20: Vec<i64> = assembly.replies_by_root[&20].iter().map(|r| r.id).collect();
        assert_eq!(group10, vec![31, 33]);
        assert_eq!(group20, vec![32, 34]);

        // No reply appears in more than one group.
        let mut seen = std::collections::HashSet::new();
        for id in group10.iter().chain(group20.iter()) {
            assert!(seen.insert(*id), "reply {id} grouped twice");
        }
        assert_eq!(assembly.orphan_count, 0);
    }

    #[test]
    fn empty_page_yields_empty_assembly() {
        let assembly = assemble_threads(&[], vec![reply(31, 10, Some(10))]);
        assert!(assembly.replies_by_root.is_empty());
        assert_eq!(assembly.orphan_count, 1);
    }

    #[test]
    fn input_order_is_preserved_within_groups() {
        let candidates = vec![reply(33, 10, Some(10)), reply(31, 10, None), reply(32, 10, Some(10))];
        let assembly = assemble_threads(&[10], candidates);
        let ids: Vec<i64> = assembly.replies_by_root[&10].iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![33, 31, 32]);
    }
}
