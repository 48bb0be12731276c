mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use unison_drive::plan::{apply_action, fold, Column, Node, SortRule};
    use unison_drive::{
        Action, AlertKind, Content, ContentStatus, ContentType, Diff, Engine, Item, Message,
        Progress, State, Update,
    };

    // =========================================================================
    // Chunking
    // =========================================================================

    /// What an observer can see once the stream has been consumed.
    #[derive(Debug, PartialEq)]
    struct Observed {
        state: State,
        status: String,
        progress: Option<Progress>,
        left: String,
        right: String,
        items: Option<Vec<Item>>,
        input: Vec<u8>,
        messages: Vec<Message>,
        alerts: Vec<(String, AlertKind)>,
        diffs: Vec<Diff>,
    }

    #[derive(Default)]
    struct Collected {
        input: Vec<u8>,
        messages: Vec<Message>,
        alerts: Vec<(String, AlertKind)>,
        diffs: Vec<Diff>,
    }

    impl Collected {
        /// Record an update, confirming any alert it raises.
        fn take(&mut self, engine: &mut Engine, update: Update) {
            self.input.extend_from_slice(&update.input);
            self.messages.extend(update.messages);
            self.diffs.extend(update.diff);
            if let Some(alert) = update.alert {
                self.alerts.push((alert.text().to_string(), alert.kind));
                let answer = alert.proceed(engine);
                self.take(engine, answer);
            }
        }

        fn segments(&mut self, engine: &mut Engine, segments: &[String], cuts: &[usize]) {
            for segment in segments {
                for chunk in split(segment.as_bytes(), cuts) {
                    let update = engine.proc_output(chunk);
                    self.take(engine, update);
                }
            }
        }
    }

    /// Segments of backend output. The backend stops after each prompt until
    /// it gets an answer, so a prompt always ends a segment.
    fn plan_segments() -> Vec<String> {
        vec![
            STARTUP[..3].concat() + EMPTIED_WARNING,
            STARTUP[3].to_string() + FIRST_PROMPT,
            LISTING.to_string(),
        ]
    }

    fn diff_segments() -> Vec<String> {
        vec![
            prompt_for(ROW1),
            prompt_for(ROW2),
            prompt_for(ROW3),
            DIFF_BLOCK.to_string() + &prompt_for(ROW3),
        ]
    }

    fn sync_segments() -> Vec<String> {
        vec![
            prompt_for(ROW1),
            prompt_for(ROW2),
            prompt_for(ROW3),
            PROCEED.to_string(),
            AFTER_PROCEED.concat(),
        ]
    }

    /// Run a session, splitting each segment at `cuts` (taken modulo its length).
    fn run(cuts: &[usize]) -> Observed {
        let mut engine = Engine::new();
        let mut seen = Collected::default();

        let update = engine.proc_start();
        seen.take(&mut engine, update);
        seen.segments(&mut engine, &plan_segments(), cuts);

        let update = engine.diff("dir/file3").expect("diff enabled once the plan is ready");
        seen.take(&mut engine, update);
        seen.segments(&mut engine, &diff_segments(), cuts);

        let update = engine.sync().expect("sync enabled after the diff");
        seen.take(&mut engine, update);
        seen.segments(&mut engine, &sync_segments(), cuts);

        Observed {
            state: engine.state().clone(),
            status: engine.status().to_string(),
            progress: engine.progress().cloned(),
            left: engine.left().to_string(),
            right: engine.right().to_string(),
            items: engine.items().map(|items| items.to_vec()),
            input: seen.input,
            messages: seen.messages,
            alerts: seen.alerts,
            diffs: seen.diffs,
        }
    }

    fn split<'a>(bytes: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
        let mut points: Vec<usize> = cuts
            .iter()
            .map(|c| c % bytes.len())
            .filter(|&c| c > 0)
            .collect();
        points.sort_unstable();
        points.dedup();
        let mut chunks = Vec::new();
        let mut start = 0;
        for point in points {
            chunks.push(&bytes[start..point]);
            start = point;
        }
        chunks.push(&bytes[start..]);
        chunks
    }

    #[test]
    fn test_whole_session_reaches_completion() {
        let observed = run(&[]);
        assert_eq!(observed.state, State::Completed);
        assert_eq!(observed.input, b"yl0nnd0></y");
        assert!(observed.messages.is_empty());
        assert_eq!(observed.items.as_ref().map(Vec::len), Some(3));
        assert_eq!(observed.alerts.len(), 1);
        assert!(observed.alerts[0].0.ends_with("Do you really want to proceed?"));
        assert_eq!(observed.diffs.len(), 1);
        assert_eq!(observed.diffs[0].path, "dir/file3");
        assert!(observed.diffs[0].text.ends_with("+hello right"));
    }

    #[test]
    fn test_single_bytes_match_whole_chunks() {
        let whole = run(&[]);
        let every: Vec<usize> = (1..4096).collect();
        assert_eq!(run(&every), whole);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn chunking_does_not_change_the_outcome(cuts in prop::collection::vec(1usize..4096, 0..12)) {
            prop_assert_eq!(run(&cuts), run(&[]));
        }
    }

    // =========================================================================
    // Folding
    // =========================================================================

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Skip),
            Just(Action::LeftToRight),
            Just(Action::MaybeLeftToRight),
            Just(Action::RightToLeft),
            Just(Action::MaybeRightToLeft),
            Just(Action::Merge),
            Just(Action::Error),
        ]
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d.txt"]), 1..4)
            .prop_map(|parts| parts.join("/"))
    }

    fn content_strategy() -> impl Strategy<Value = Content> {
        (
            prop::sample::select(vec![
                ContentStatus::Unchanged,
                ContentStatus::Created,
                ContentStatus::Modified,
                ContentStatus::Deleted,
            ]),
            prop::sample::select(vec![
                ContentType::Absent,
                ContentType::File,
                ContentType::Directory,
            ]),
        )
            .prop_map(|(status, kind)| Content {
                kind,
                status,
                props: String::new(),
            })
    }

    fn items_strategy() -> impl Strategy<Value = Vec<Item>> {
        let entry = (path_strategy(), action_strategy(), content_strategy(), content_strategy());
        prop::collection::vec(entry, 1..24).prop_map(|raw| {
            let mut seen = HashSet::new();
            raw.into_iter()
                .filter(|(path, ..)| seen.insert(path.clone()))
                .map(|(path, action, left, right)| Item {
                    path,
                    left,
                    right,
                    action,
                })
                .collect()
        })
    }

    fn sort_strategy() -> impl Strategy<Value = SortRule> {
        (
            prop::sample::select(vec![
                Column::Plan,
                Column::Path,
                Column::Action,
                Column::Left,
                Column::Right,
            ]),
            any::<bool>(),
        )
            .prop_map(|(column, descending)| SortRule::new(column, descending))
    }

    /// Check every node below `prefix`, returning its leaves' plan indices.
    fn check_node(node: &Node, prefix: &str, items: &[Item]) -> Result<Vec<usize>, TestCaseError> {
        let full = format!("{}{}", prefix, node.name);
        match node.item {
            Some(index) => {
                prop_assert!(node.children.is_empty());
                prop_assert_eq!(&full, &items[index].path);
                prop_assert_eq!(node.action, items[index].action);
                Ok(vec![index])
            }
            None => {
                prop_assert!(node.children.len() >= 2, "internal node {} has {} children", full, node.children.len());
                prop_assert!(node.name.ends_with('/'));
                let first = node.children[0].action;
                if node.children.iter().all(|c| c.action == first) {
                    prop_assert_eq!(node.action, first);
                } else {
                    prop_assert_eq!(node.action, Action::Mixed);
                }
                let mut leaves = Vec::new();
                for child in &node.children {
                    leaves.extend(check_node(child, &full, items)?);
                }
                Ok(leaves)
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn fold_keeps_leaves_in_order(items in items_strategy(), sort in sort_strategy()) {
            let tree = fold(&items, sort);
            let mut leaves = Vec::new();
            for root in &tree.roots {
                leaves.extend(check_node(root, "", &items)?);
            }

            let mut expected: Vec<usize> = (0..items.len()).collect();
            expected.sort_by(|&a, &b| {
                let ord = match sort.column {
                    Column::Path => items[a].path.cmp(&items[b].path),
                    Column::Action => items[a].action.cmp(&items[b].action),
                    Column::Left => (items[a].left.status, items[a].left.kind)
                        .cmp(&(items[b].left.status, items[b].left.kind)),
                    Column::Right => (items[a].right.status, items[a].right.kind)
                        .cmp(&(items[b].right.status, items[b].right.kind)),
                    Column::Plan => std::cmp::Ordering::Equal,
                };
                if sort.descending { ord.reverse() } else { ord }
            });
            prop_assert_eq!(leaves, expected);
        }

        #[test]
        fn refolding_after_an_action_change_matches_the_tree(
            items in items_strategy(),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
            action in action_strategy(),
        ) {
            let tree = fold(&items, SortRule::default());
            let nodes = tree.walk();
            let mut chosen = HashSet::new();
            for pick in &picks {
                let (_, node) = nodes[pick.index(nodes.len())];
                chosen.extend(node.leaves());
            }

            let expected: Vec<(String, Action)> = tree
                .walk()
                .into_iter()
                .filter_map(|(_, n)| n.item)
                .map(|i| {
                    let a = if chosen.contains(&i) { action } else { items[i].action };
                    (items[i].path.clone(), a)
                })
                .collect();

            let mut changed = items.clone();
            let indices: Vec<usize> = chosen.into_iter().collect();
            apply_action(&mut changed, &indices, action).unwrap();
            let refolded = fold(&changed, SortRule::default());
            let actual: Vec<(String, Action)> = refolded
                .walk()
                .into_iter()
                .filter(|(_, n)| n.is_leaf())
                .map(|(_, n)| (n.path.clone(), n.action))
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
