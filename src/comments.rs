use std::collections::HashMap;

use crate::data::{CommentId, CommentRecord};

/// A single comment in a built thread. Children are indices into the owning
/// [`CommentForest`], in the order their records appeared in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub id: CommentId,
    pub author: String,
    pub content: String,
    pub score: i64,
    pub children: Vec<usize>,
}

/// Ordered forest of comments for one post, stored as a dense arena.
///
/// Node `i` is built from input record `i`, so arena order is input order.
/// The forest is never mutated after [`CommentForest::build`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentForest {
    nodes: Vec<CommentNode>,
    roots: Vec<usize>,
}

impl CommentForest {
    /// Builds the forest in two passes: one node per record keyed by id,
    /// then every record is attached under its parent when the parent is
    /// present. Records without a parent, or whose parent is missing from
    /// the input, become roots.
    pub fn build(records: &[CommentRecord]) -> Self {
        let mut nodes = Vec::with_capacity(records.len());
        let mut index: HashMap<CommentId, usize> = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            nodes.push(CommentNode {
                id: record.id,
                author: record.author.clone(),
                content: record.content.clone(),
                score: record.score,
                children: Vec::new(),
            });
            // First occurrence wins for duplicated ids.
            index.entry(record.id).or_insert(i);
        }

        let mut parent_of: Vec<Option<usize>> = vec![None; records.len()];
        let mut roots = Vec::new();
        for (i, record) in records.iter().enumerate() {
            match record.parent.and_then(|id| index.get(&id).copied()) {
                Some(parent) if parent != i => {
                    nodes[parent].children.push(i);
                    parent_of[i] = Some(parent);
                }
                _ => roots.push(i),
            }
        }

        let mut forest = CommentForest { nodes, roots };
        forest.break_cycles(&mut parent_of);
        forest
    }

    /// Parent links that loop back on themselves leave whole groups of nodes
    /// unreachable from any root. The first node of each such group (in input
    /// order) is detached from its parent and promoted to a root.
    fn break_cycles(&mut self, parent_of: &mut [Option<usize>]) {
        let mut reached = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self.roots.clone();
        self.mark_reached(&mut stack, &mut reached);

        let mut promoted = false;
        for i in 0..self.nodes.len() {
            if reached[i] {
                continue;
            }
            if let Some(parent) = parent_of[i].take() {
                self.nodes[parent].children.retain(|&child| child != i);
            }
            self.roots.push(i);
            promoted = true;
            stack.push(i);
            self.mark_reached(&mut stack, &mut reached);
        }

        if promoted {
            self.roots.sort_unstable();
        }
    }

    fn mark_reached(&self, stack: &mut Vec<usize>, reached: &mut [bool]) {
        while let Some(i) = stack.pop() {
            if reached[i] {
                continue;
            }
            reached[i] = true;
            stack.extend(self.nodes[i].children.iter().copied());
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &CommentNode> + '_ {
        self.roots.iter().map(move |&i| &self.nodes[i])
    }

    pub fn node(&self, index: usize) -> Option<&CommentNode> {
        self.nodes.get(index)
    }

    pub fn children<'a>(&'a self, node: &'a CommentNode) -> impl Iterator<Item = &'a CommentNode> + 'a {
        node.children.iter().map(move |&i| &self.nodes[i])
    }

    /// Depth-first, pre-order traversal yielding each node with its depth
    /// (roots are depth 0).
    pub fn walk(&self) -> Walk<'_> {
        let stack = self.roots.iter().rev().map(|&i| (i, 0)).collect();
        Walk {
            forest: self,
            stack,
        }
    }
}

pub struct Walk<'a> {
    forest: &'a CommentForest,
    stack: Vec<(usize, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a CommentNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (index, depth) = self.stack.pop()?;
        let node = &self.forest.nodes[index];
        self.stack
            .extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        Some((depth, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(id: CommentId, parent: Option<CommentId>, content: &str) -> CommentRecord {
        CommentRecord {
            id,
            parent,
            post_id: 7,
            author: "tester".into(),
            content: content.into(),
            score: 1,
        }
    }

    fn shape(forest: &CommentForest, node: &CommentNode) -> String {
        let children: Vec<String> = forest
            .children(node)
            .map(|child| shape(forest, child))
            .collect();
        if children.is_empty() {
            node.content.clone()
        } else {
            format!("{}[{}]", node.content, children.join(","))
        }
    }

    fn forest_shape(forest: &CommentForest) -> Vec<String> {
        forest.roots().map(|root| shape(forest, root)).collect()
    }

    #[test]
    fn builds_nested_thread() {
        let records = vec![
            record(1, None, "A"),
            record(2, Some(1), "B"),
            record(3, None, "C"),
            record(4, Some(2), "D"),
        ];
        let forest = CommentForest::build(&records);
        assert_eq!(forest_shape(&forest), vec!["A[B[D]]", "C"]);
    }

    #[test]
    fn orphan_becomes_root() {
        let records = vec![
            record(1, None, "A"),
            record(2, Some(99), "orphan"),
            record(3, Some(1), "B"),
        ];
        let forest = CommentForest::build(&records);
        assert_eq!(forest_shape(&forest), vec!["A[B]", "orphan"]);
    }

    #[test]
    fn child_before_parent_still_attaches() {
        let records = vec![record(2, Some(1), "B"), record(1, None, "A")];
        let forest = CommentForest::build(&records);
        assert_eq!(forest_shape(&forest), vec!["A[B]"]);
    }

    #[test]
    fn self_parent_is_root() {
        let records = vec![record(1, Some(1), "loop")];
        let forest = CommentForest::build(&records);
        assert_eq!(forest_shape(&forest), vec!["loop"]);
    }

    #[test]
    fn cycles_are_broken_at_first_input_node() {
        let records = vec![
            record(1, Some(2), "A"),
            record(2, Some(1), "B"),
            record(3, None, "C"),
        ];
        let forest = CommentForest::build(&records);
        assert_eq!(forest_shape(&forest), vec!["A[B]", "C"]);
        assert_eq!(forest.walk().count(), 3);
    }

    #[test]
    fn walk_reports_depths_in_preorder() {
        let records = vec![
            record(1, None, "A"),
            record(2, Some(1), "B"),
            record(3, None, "C"),
            record(4, Some(2), "D"),
            record(5, Some(1), "E"),
        ];
        let forest = CommentForest::build(&records);
        let walked: Vec<(usize, &str)> = forest
            .walk()
            .map(|(depth, node)| (depth, node.content.as_str()))
            .collect();
        assert_eq!(
            walked,
            vec![(0, "A"), (1, "B"), (2, "D"), (1, "E"), (0, "C")]
        );
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        let forest = CommentForest::build(&[]);
        assert!(forest.is_empty());
        assert_eq!(forest.roots().count(), 0);
    }

    fn arbitrary_records() -> impl Strategy<Value = Vec<CommentRecord>> {
        prop::collection::vec((0i64..40, prop::option::of(0i64..40)), 0..60).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (id, parent))| record(id, parent, &i.to_string()))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn every_record_appears_exactly_once(records in arbitrary_records()) {
            let forest = CommentForest::build(&records);
            let mut seen: Vec<usize> = forest
                .walk()
                .map(|(_, node)| node.content.parse::<usize>().unwrap())
                .collect();
            seen.sort_unstable();
            let expected: Vec<usize> = (0..records.len()).collect();
            prop_assert_eq!(seen, expected);
        }

        #[test]
        fn siblings_keep_input_order(records in arbitrary_records()) {
            let forest = CommentForest::build(&records);
            for (_, node) in forest.walk() {
                let order: Vec<usize> = forest
                    .children(node)
                    .map(|child| child.content.parse::<usize>().unwrap())
                    .collect();
                prop_assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
            }
            let roots: Vec<usize> = forest
                .roots()
                .map(|root| root.content.parse::<usize>().unwrap())
                .collect();
            prop_assert!(roots.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
