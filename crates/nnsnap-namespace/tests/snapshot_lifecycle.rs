use nnsnap_diff::DiffChange;
use nnsnap_namespace::{Namespace, NamespaceConfig, RecordingPipeline, run_lifecycle_demo};
use nnsnap_types::{FileId, Replication, SnapshotId, total_len};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

const BLOCK: u64 = 100;

fn namespace() -> Namespace<RecordingPipeline> {
    let config = NamespaceConfig {
        block_size: BLOCK,
        ..NamespaceConfig::default()
    };
    Namespace::new(config, RecordingPipeline::new()).expect("namespace")
}

#[test]
fn lifecycle_demo_invariant() {
    let result = run_lifecycle_demo().expect("demo should succeed");
    assert_eq!(result.s1_size, 192 * 1024);
    assert_eq!(result.s2_size, 224 * 1024);
    assert_eq!(result.current_size, 128 * 1024);
    assert!(result.file_destroyed);
}

#[test]
fn deleting_newer_snapshot_retags_diff_to_prior() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 250).expect("append");
    let s1 = ns.create_snapshot().expect("s1");
    let s2 = ns.create_snapshot().expect("s2");
    ns.append(file, 50).expect("append");

    let deletion = ns.delete_snapshot(s2).expect("delete s2");
    assert_eq!(deletion.files.len(), 1);
    assert_eq!(
        deletion.files[0].outcome.change,
        DiffChange::Retagged { to: s1 }
    );
    assert_eq!(deletion.collected_blocks, 0);

    let state = ns.export_state(file).expect("state");
    assert_eq!(state.diffs.len(), 1);
    assert_eq!(state.diffs[0].snapshot(), s1);
    assert_eq!(ns.reconstruct_view(file, s1).expect("view").size, 250);
    assert_eq!(ns.current_view(file).expect("view").size, 300);
}

#[test]
fn snapshot_without_diff_deletes_as_noop() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 300).expect("append");
    let snap = ns.create_snapshot().expect("snapshot");

    let deletion = ns.delete_snapshot(snap).expect("delete");
    assert_eq!(deletion.files[0].outcome.change, DiffChange::Unchanged);
    assert_eq!(deletion.collected_blocks, 0);
    assert_eq!(ns.export_state(file).expect("state").blocks.len(), 3);
    assert!(ns.delete_snapshot(snap).is_err());
}

#[test]
fn deleted_file_releases_blocks_as_snapshots_go() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 300).expect("append");
    let s1 = ns.create_snapshot().expect("s1");
    ns.append(file, 100).expect("append");
    let s2 = ns.create_snapshot().expect("s2");

    let on_delete = ns.delete_file(file).expect("delete file");
    assert_eq!(on_delete.max_size, 400);
    assert_eq!(on_delete.collected_blocks, 0);
    assert!(!on_delete.destroyed);
    assert_eq!(ns.reconstruct_view(file, s2).expect("s2 view").size, 400);

    let after_s2 = ns.delete_snapshot(s2).expect("delete s2");
    assert_eq!(after_s2.collected_blocks, 1);
    assert_eq!(after_s2.files[0].outcome.max_size, 300);
    let collected = ns.collected_blocks();
    assert_eq!(collected.len(), 1);
    let kept = ns.export_state(file).expect("state").blocks;
    assert_eq!(total_len(&kept), 300);
    assert!(!kept.contains(&collected[0]));
    assert_eq!(ns.reconstruct_view(file, s1).expect("s1 view").size, 300);

    let after_s1 = ns.delete_snapshot(s1).expect("delete s1");
    assert_eq!(after_s1.destroyed_files, vec![file]);
    assert_eq!(after_s1.collected_blocks, 3);
    assert!(!ns.contains_file(file));
    assert_eq!(ns.collected_blocks().len(), 4);
}

#[test]
fn file_without_snapshots_collects_every_block_once() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    let blocks = ns.append(file, 450).expect("append");
    let outcome = ns.delete_file(file).expect("delete");
    assert!(outcome.destroyed);
    assert_eq!(outcome.collected_blocks, blocks.len());
    assert_eq!(ns.collected_blocks(), blocks);
    assert_eq!(ns.live_block_count(), 0);
    assert!(!ns.contains_file(file));
}

#[test]
fn deleting_file_keeps_latest_snapshot_view() {
    let ns = namespace();
    let file = ns.create_file(Some(4)).expect("create");
    ns.append(file, 120).expect("append");
    let snap = ns.create_snapshot().expect("snapshot");
    ns.delete_file(file).expect("delete");

    let view = ns.reconstruct_view(file, snap).expect("view");
    assert_eq!(view.size, 120);
    assert_eq!(view.replication, Replication(4));
    assert!(ns.current_view(file).is_err());
    assert_eq!(ns.required_replication(file).expect("rep"), Replication(4));
}

#[test]
fn replication_drops_once_snapshot_is_gone() {
    let ns = namespace();
    let file = ns.create_file(Some(5)).expect("create");
    ns.append(file, 10).expect("append");
    let snap = ns.create_snapshot().expect("snapshot");
    ns.set_replication(file, 2).expect("lower");
    assert_eq!(ns.required_replication(file).expect("rep"), Replication(5));

    ns.delete_snapshot(snap).expect("delete");
    assert_eq!(ns.required_replication(file).expect("rep"), Replication(2));
    let targets: Vec<u16> =
        ns.with_pipeline(|pipeline| pipeline.requests().iter().map(|(_, r)| r.0).collect());
    assert_eq!(targets, vec![5, 2]);
    assert_eq!(ns.with_pipeline(|pipeline| pipeline.target(file)), Some(Replication(2)));
}

#[test]
fn shrink_then_snapshot_then_grow() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 300).expect("append");
    let s1 = ns.create_snapshot().expect("s1");
    let displaced = ns.truncate(file, 1).expect("truncate");
    assert_eq!(displaced.len(), 2);
    let s2 = ns.create_snapshot().expect("s2");
    ns.append(file, 250).expect("grow");

    assert_eq!(ns.reconstruct_view(file, s1).expect("s1").size, 300);
    assert_eq!(ns.reconstruct_view(file, s2).expect("s2").size, 100);
    assert_eq!(ns.current_view(file).expect("live").size, 350);

    let deletion = ns.delete_snapshot(s1).expect("delete s1");
    assert_eq!(deletion.collected_blocks, 0);
    assert_eq!(deletion.released_blocks, 2, "only s1 reached the cut tail");
    assert_eq!(ns.collected_blocks(), displaced);
    assert_eq!(ns.reconstruct_view(file, s2).expect("s2").size, 100);
    assert_eq!(ns.export_state(file).expect("state").blocks.len(), 4);
    assert_eq!(ns.live_block_count(), 4);
}

#[test]
fn truncate_then_delete_file_frees_every_block() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 300).expect("append");
    let displaced = ns.truncate(file, 1).expect("truncate");
    assert_eq!(displaced.len(), 2);
    let outcome = ns.delete_file(file).expect("delete");
    assert!(outcome.destroyed);
    assert_eq!(ns.collected_blocks().len(), 3);
    assert_eq!(ns.live_block_count(), 0);
}

#[test]
fn truncate_under_snapshot_frees_tail_with_last_covering_view() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 300).expect("append");
    let s1 = ns.create_snapshot().expect("s1");
    ns.truncate(file, 1).expect("truncate");
    assert_eq!(ns.live_block_count(), 3, "s1 still reaches the tail");
    assert_eq!(ns.export_state(file).expect("state").retained.len(), 2);

    ns.delete_file(file).expect("delete file");
    assert_eq!(ns.reconstruct_view(file, s1).expect("s1").size, 300);
    assert_eq!(ns.live_block_count(), 3);

    let deletion = ns.delete_snapshot(s1).expect("delete s1");
    assert_eq!(deletion.destroyed_files, vec![file]);
    assert_eq!(deletion.collected_blocks + deletion.released_blocks, 3);
    assert_eq!(ns.live_block_count(), 0);
}

#[test]
fn readers_share_the_namespace_with_a_writer() {
    let ns = namespace();
    let file = ns.create_file(None).expect("create");
    ns.append(file, 500).expect("append");
    let snap = ns.create_snapshot().expect("snapshot");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let view = ns.reconstruct_view(file, snap).expect("view");
                    assert_eq!(view.size, 500);
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..50 {
                ns.append(file, 10).expect("append");
            }
        });
    });

    assert_eq!(ns.current_view(file).expect("live").size, 1_000);
    assert_eq!(ns.reconstruct_view(file, snap).expect("view").size, 500);
}

#[derive(Debug, Clone)]
enum Step {
    Snapshot,
    DeleteSnapshot(usize),
    Append(u64),
    Truncate(usize),
    SetReplication(u16),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => Just(Step::Snapshot),
        2 => any::<usize>().prop_map(Step::DeleteSnapshot),
        3 => (1_u64..350).prop_map(Step::Append),
        1 => (0_usize..8).prop_map(Step::Truncate),
        2 => (1_u16..8).prop_map(Step::SetReplication),
    ]
}

fn check_views(
    ns: &Namespace<RecordingPipeline>,
    file: FileId,
    truth: &BTreeMap<SnapshotId, (u64, Replication)>,
) -> Result<(), TestCaseError> {
    for (snap, (size, rep)) in truth {
        let view = ns.reconstruct_view(file, *snap).expect("view");
        prop_assert_eq!(view.size, *size, "size at {}", snap);
        prop_assert_eq!(view.replication, *rep, "replication at {}", snap);
    }
    Ok(())
}

proptest! {
    #[test]
    fn snapshot_views_and_reclamation_hold(
        steps in proptest::collection::vec(step_strategy(), 1..60)
    ) {
        let ns = namespace();
        let file = ns.create_file(Some(3)).expect("create");
        let mut truth: BTreeMap<SnapshotId, (u64, Replication)> = BTreeMap::new();

        for step in steps {
            match step {
                Step::Snapshot => {
                    let snap = ns.create_snapshot().expect("snapshot");
                    let live = ns.current_view(file).expect("live");
                    truth.insert(snap, (live.size, live.replication));
                }
                Step::DeleteSnapshot(pick) => {
                    if truth.is_empty() {
                        continue;
                    }
                    let snap = *truth.keys().nth(pick % truth.len()).expect("pick");
                    truth.remove(&snap);
                    let deletion = ns.delete_snapshot(snap).expect("delete");

                    let live = ns.current_view(file).expect("live");
                    let expected_max = truth
                        .values()
                        .map(|(size, _)| *size)
                        .fold(live.size, u64::max);
                    let outcome = deletion.files[0].outcome;
                    prop_assert_eq!(outcome.max_size, expected_max);
                    prop_assert!(!outcome.destroyed);

                    prop_assert_eq!(outcome.collected_blocks, 0, "live blocks stay");

                    let state = ns.export_state(file).expect("state");
                    prop_assert!(total_len(&state.blocks) <= expected_max);
                    for block in ns.collected_blocks() {
                        prop_assert!(!state.blocks.contains(&block));
                        prop_assert!(!state.retained.iter().any(|r| r.block == block));
                    }
                }
                Step::Append(bytes) => {
                    ns.append(file, bytes).expect("append");
                }
                Step::Truncate(keep) => {
                    let blocks = ns.export_state(file).expect("state").blocks.len();
                    ns.truncate(file, keep % (blocks + 1)).expect("truncate");
                }
                Step::SetReplication(rep) => {
                    ns.set_replication(file, rep).expect("set replication");
                }
            }

            check_views(&ns, file, &truth)?;
            let live = ns.current_view(file).expect("live");
            let expected_rep = truth
                .values()
                .map(|(_, rep)| *rep)
                .fold(live.replication, Replication::max);
            prop_assert_eq!(ns.required_replication(file).expect("rep"), expected_rep);
            prop_assert_eq!(ns.with_pipeline(|p| p.target(file)), Some(expected_rep));
        }

        ns.delete_file(file).expect("delete file");
        for snap in ns.snapshots() {
            ns.delete_snapshot(snap).expect("drain snapshots");
        }
        prop_assert!(!ns.contains_file(file));
        prop_assert_eq!(ns.live_block_count(), 0);
        let unique: HashSet<_> = ns.collected_blocks().iter().map(|b| b.id).collect();
        prop_assert_eq!(unique.len(), ns.collected_blocks().len());
    }

    #[test]
    fn deleted_file_lifecycle_keeps_views_until_destroyed(
        steps in proptest::collection::vec(step_strategy(), 1..40),
        order in proptest::collection::vec(any::<usize>(), 0..40),
    ) {
        let ns = namespace();
        let file = ns.create_file(Some(3)).expect("create");
        let mut truth: BTreeMap<SnapshotId, (u64, Replication)> = BTreeMap::new();
        for step in steps {
            match step {
                Step::Snapshot => {
                    let snap = ns.create_snapshot().expect("snapshot");
                    let live = ns.current_view(file).expect("live");
                    truth.insert(snap, (live.size, live.replication));
                }
                Step::DeleteSnapshot(_) => {}
                Step::Append(bytes) => {
                    ns.append(file, bytes).expect("append");
                }
                Step::Truncate(keep) => {
                    let blocks = ns.export_state(file).expect("state").blocks.len();
                    ns.truncate(file, keep % (blocks + 1)).expect("truncate");
                }
                Step::SetReplication(rep) => {
                    ns.set_replication(file, rep).expect("set replication");
                }
            }
        }

        let outcome = ns.delete_file(file).expect("delete file");
        prop_assert_eq!(outcome.destroyed, truth.is_empty());
        prop_assert!(ns.current_view(file).is_err());

        let mut picks = order.into_iter();
        while !truth.is_empty() {
            check_views(&ns, file, &truth)?;
            let expected_rep = truth
                .values()
                .map(|(_, rep)| *rep)
                .fold(Replication::NONE, Replication::max);
            prop_assert_eq!(ns.required_replication(file).expect("rep"), expected_rep);
            prop_assert_eq!(ns.with_pipeline(|p| p.target(file)), Some(expected_rep));

            let pick = picks.next().unwrap_or(0) % truth.len();
            let snap = *truth.keys().nth(pick).expect("pick");
            truth.remove(&snap);
            let deletion = ns.delete_snapshot(snap).expect("delete snapshot");
            prop_assert_eq!(deletion.destroyed_files.is_empty(), !truth.is_empty());
        }

        prop_assert!(!ns.contains_file(file));
        prop_assert_eq!(ns.live_block_count(), 0);
    }
}
