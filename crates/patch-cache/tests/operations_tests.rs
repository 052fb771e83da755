//! End-to-end behavior of the diff service over in-memory repositories.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bstr::BString;
use patch_cache::keys::{FileDiffKey, GitFileDiffKey, IntraLineKey};
use patch_cache::{CacheError, ComparisonType, DiffConfig, DiffOperations, DiffOptions};
use patch_diff::{DiffAlgorithm, Edit, FileDiffEngine, IntraLineStatus, Whitespace};
use patch_hash::ContentId;
use patch_merge::{
    strategy_for, MergeError, MergeOptions, MergeStrategy, MergeStrategyKind, TreeMerge,
};
use patch_object::memory::{MemoryRepository, MemoryRepositoryManager};
use patch_object::{ChangeKind, ObjectReader, ProjectName, Repository};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn project() -> ProjectName {
    "project".into()
}

fn config() -> DiffConfig {
    let mut config = DiffConfig::default();
    config.diff.worker_threads = 2;
    config
}

fn service_with(config: DiffConfig) -> (Arc<MemoryRepository>, DiffOperations) {
    init_tracing();
    let manager = Arc::new(MemoryRepositoryManager::new());
    let repo = manager.create(&project());
    let ops = DiffOperations::new(manager, config).unwrap();
    (repo, ops)
}

fn service() -> (Arc<MemoryRepository>, DiffOperations) {
    service_with(config())
}

fn paths<V>(files: &std::collections::BTreeMap<BString, V>) -> Vec<String> {
    files.keys().map(|p| p.to_string()).collect()
}

#[test]
fn single_line_change_and_its_refinement() {
    let (repo, ops) = service();
    let old = repo.commit(repo.write_tree(&[("f", b"a\nb\nc")]), &[], "old");
    let new = repo.commit(repo.write_tree(&[("f", b"a\nB\nc")]), &[old], "new");
    let options = DiffOptions::default();

    let diff = ops
        .get_modified_file(&project(), &old, &new, b"f", &options)
        .unwrap();
    assert_eq!(diff.comparison, ComparisonType::AgainstParent(1));
    assert_eq!(diff.change_kind, ChangeKind::Modified);
    assert_eq!(diff.edits, vec![Edit::new(1, 2, 1, 2)]);
    assert!(diff.rebase_edits.is_empty());
    assert_eq!((diff.insertions(), diff.deletions()), (1, 1));

    let refined = ops.get_intraline_diff(&project(), &diff, &options).unwrap();
    assert_eq!(refined.status, IntraLineStatus::Ok);
    assert_eq!(refined.edits.len(), 1);
    assert_eq!(refined.edits[0].sub_edits, vec![Edit::new(0, 1, 0, 1)]);
}

#[test]
fn repeated_lookups_are_identical() {
    let (repo, ops) = service();
    let old = repo.commit(repo.write_tree(&[("f", b"1\n2\n3\n")]), &[], "old");
    let new = repo.commit(repo.write_tree(&[("f", b"1\ntwo\n3\n4\n")]), &[old], "new");
    let options = DiffOptions::default();

    let first = ops
        .get_modified_file(&project(), &old, &new, b"f", &options)
        .unwrap();
    let second = ops
        .get_modified_file(&project(), &old, &new, b"f", &options)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    ops.file_diffs().invalidate(&FileDiffKey {
        project: project(),
        old_commit: Some(old),
        new_commit: new,
        path: "f".into(),
        comparison: ComparisonType::AgainstParent(1),
        rename_score: options.rename_score,
        algorithm: options.algorithm,
        whitespace: options.whitespace,
        use_timeout: true,
    });
    let recomputed = ops
        .get_modified_file(&project(), &old, &new, b"f", &options)
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &recomputed));
    assert_eq!(*first, *recomputed);
}

#[test]
fn unchanged_path_is_the_empty_sentinel() {
    let (repo, ops) = service();
    let old = repo.commit(repo.write_tree(&[("a", b"1\n"), ("b", b"1\n")]), &[], "old");
    let new = repo.commit(repo.write_tree(&[("a", b"2\n"), ("b", b"1\n")]), &[old], "new");

    let diff = ops
        .get_modified_file(&project(), &old, &new, b"b", &DiffOptions::default())
        .unwrap();
    assert!(diff.is_empty());
    assert!(!diff.is_negative());
    assert!(diff.edits.is_empty());
}

#[test]
fn large_blob_is_reported_as_too_large() {
    let mut config = config();
    config.diff.large_object_threshold = 16;
    let (repo, ops) = service_with(config);
    let old = repo.commit(repo.write_tree(&[("f", b"short\n")]), &[], "old");
    let new = repo.commit(
        repo.write_tree(&[("f", b"this line is well past the limit\n")]),
        &[old],
        "new",
    );

    let err = ops
        .get_modified_file(&project(), &old, &new, b"f", &DiffOptions::default())
        .unwrap_err();
    assert!(err.is_too_large(), "{err}");
    let err = ops
        .list_modified_files(&project(), &old, &new, &DiffOptions::default())
        .unwrap_err();
    assert!(matches!(err, CacheError::TooLarge { limit: 16, .. }));
}

#[test]
fn missing_commit_is_unavailable() {
    let (repo, ops) = service();
    let old = repo.commit(repo.write_tree(&[]), &[], "old");
    let missing = ContentId::from_raw([7; 20]);
    let err = ops
        .list_modified_files(&project(), &old, &missing, &DiffOptions::default())
        .unwrap_err();
    assert!(err.is_unavailable());
}

struct Rebased {
    repo: Arc<MemoryRepository>,
    ops: DiffOperations,
    ps1: ContentId,
    ps2: ContentId,
}

/// Patch set 1 edits line 8 on `base`; upstream edits line 2; patch set 2
/// is patch set 1 rebased onto upstream with `line8` as its line 8.
fn rebased(line8: &[u8]) -> Rebased {
    let (repo, ops) = service();
    let lines = |two: &[u8], eight: &[u8]| {
        let mut text = Vec::new();
        for line in [b"1" as &[u8], two, b"3", b"4", b"5", b"6", b"7", eight, b"9", b"10"] {
            text.extend_from_slice(line);
            text.push(b'\n');
        }
        text
    };
    let base = repo.commit(repo.write_tree(&[("f", &lines(b"2", b"8"))]), &[], "base");
    let upstream = repo.commit(
        repo.write_tree(&[("f", &lines(b"two", b"8"))]),
        &[base],
        "upstream",
    );
    let ps1 = repo.commit(
        repo.write_tree(&[("f", &lines(b"2", b"eight"))]),
        &[base],
        "change",
    );
    let ps2 = repo.commit(
        repo.write_tree(&[("f", &lines(b"two", line8))]),
        &[upstream],
        "change",
    );
    Rebased { repo, ops, ps1, ps2 }
}

#[test]
fn edits_brought_in_by_rebase_are_marked() {
    let Rebased { ops, ps1, ps2, .. } = rebased(b"EIGHT");
    let files = ops
        .list_modified_files(&project(), &ps1, &ps2, &DiffOptions::default())
        .unwrap();
    assert_eq!(paths(&files), ["/COMMIT_MSG", "f"]);

    let diff = &files[&BString::from("f")];
    assert_eq!(diff.comparison, ComparisonType::AgainstOtherSnapshot);
    assert_eq!(diff.edits, vec![Edit::new(1, 2, 1, 2), Edit::new(7, 8, 7, 8)]);
    assert_eq!(diff.rebase_edits, vec![Edit::new(1, 2, 1, 2)]);
    assert!(diff.rebase_edits.iter().all(|e| diff.edits.contains(e)));
    assert_eq!((diff.insertions(), diff.deletions()), (1, 1));

    let summary = ops
        .get_diff_summary(&project(), Some(&ps1), &ps2, Whitespace::IgnoreNone)
        .unwrap();
    assert_eq!(summary.paths, vec![BString::from("f")]);
    assert_eq!((summary.insertions, summary.deletions), (1, 1));
}

#[test]
fn file_changed_only_by_rebase_is_left_out() {
    let Rebased { ops, ps1, ps2, .. } = rebased(b"eight");
    let files = ops
        .list_modified_files(&project(), &ps1, &ps2, &DiffOptions::default())
        .unwrap();
    assert_eq!(paths(&files), ["/COMMIT_MSG"]);

    let diff = ops
        .get_modified_file(&project(), &ps1, &ps2, b"f", &DiffOptions::default())
        .unwrap();
    assert!(diff.is_empty());
}

#[test]
fn commit_message_is_diffed_between_patch_sets() {
    let Rebased { repo, ops, ps1, ps2 } = rebased(b"EIGHT");
    let files = ops
        .list_modified_files(&project(), &ps1, &ps2, &DiffOptions::default())
        .unwrap();
    let message = &files[&BString::from("/COMMIT_MSG")];
    assert_eq!(message.change_kind, ChangeKind::Modified);
    assert!(message.old_path.is_some());
    // Same message, different commit dates.
    let reader = repo.reader();
    let (a, b) = (
        reader.read_commit(&ps1).unwrap(),
        reader.read_commit(&ps2).unwrap(),
    );
    assert_eq!(a.message, b.message);
    assert!(!message.edits.is_empty());
}

struct Merge {
    left: ContentId,
    merge: ContentId,
}

/// Two sides edit different lines of `f`; the merge also adds `extra`.
fn merge_commit(repo: &Arc<MemoryRepository>) -> Merge {
    let base = repo.commit(repo.write_tree(&[("f", b"1\n2\n3\n")]), &[], "base");
    let left = repo.commit(repo.write_tree(&[("f", b"one\n2\n3\n")]), &[base], "left");
    let right = repo.commit(repo.write_tree(&[("f", b"1\n2\nthree\n")]), &[base], "right");
    let merge = repo.commit(
        repo.write_tree(&[("extra", b"x\n"), ("f", b"one\n2\nthree\n")]),
        &[left, right],
        "Merge right",
    );
    Merge {
        left,
        merge,
    }
}

#[test]
fn merge_commit_is_compared_against_its_auto_merge() {
    let (repo, ops) = service();
    let Merge { merge, left, .. } = merge_commit(&repo);

    let listing = ops
        .list_modified_files_against_parent(&project(), &merge, 0, &DiffOptions::default())
        .unwrap();
    assert_eq!(listing.comparison, ComparisonType::AgainstAutoMerge);
    assert!(!listing.files_skipped);
    let auto_merge = listing.old_commit.unwrap();
    assert_ne!(auto_merge, left);
    assert_eq!(paths(&listing.files), ["/COMMIT_MSG", "/MERGE_LIST", "extra"]);
    assert_eq!(
        listing.files[&BString::from("/MERGE_LIST")].change_kind,
        ChangeKind::Added
    );

    let reader = repo.reader();
    let synthetic = reader.read_commit(&auto_merge).unwrap();
    assert_eq!(synthetic.parents, reader.read_commit(&merge).unwrap().parents);
    assert!(repo.refs().values().any(|id| *id == auto_merge));

    let against_first = ops
        .list_modified_files_against_parent(&project(), &merge, 1, &DiffOptions::default())
        .unwrap();
    assert_eq!(against_first.old_commit, Some(left));
    assert_eq!(paths(&against_first.files), ["/COMMIT_MSG", "/MERGE_LIST", "extra", "f"]);
}

#[test]
fn unsaved_auto_merge_is_still_diffable() {
    let mut config = config();
    config.automerge.save = false;
    let (repo, ops) = service_with(config);
    let Merge { merge, .. } = merge_commit(&repo);

    let listing = ops
        .list_modified_files_against_parent(&project(), &merge, 0, &DiffOptions::default())
        .unwrap();
    assert_eq!(listing.comparison, ComparisonType::AgainstAutoMerge);
    assert!(repo.refs().is_empty());
    assert!(!repo.contains(&listing.old_commit.unwrap()));
    assert_eq!(paths(&listing.files), ["/COMMIT_MSG", "/MERGE_LIST", "extra"]);
}

#[test]
fn octopus_merge_lists_only_synthetic_files() {
    let (repo, ops) = service();
    let tree = repo.write_tree(&[("f", b"1\n")]);
    let base = repo.commit(tree, &[], "base");
    let a = repo.commit(repo.write_tree(&[("f", b"a\n")]), &[base], "a");
    let b = repo.commit(repo.write_tree(&[("g", b"b\n")]), &[base], "b");
    let octopus = repo.commit(
        repo.write_tree(&[("f", b"a\n"), ("g", b"b\n")]),
        &[base, a, b],
        "octopus",
    );

    let listing = ops
        .list_modified_files_against_parent(&project(), &octopus, 0, &DiffOptions::default())
        .unwrap();
    assert!(listing.files_skipped);
    assert_eq!(listing.comparison, ComparisonType::AgainstParent(1));
    assert_eq!(listing.old_commit, Some(base));
    assert_eq!(paths(&listing.files), ["/COMMIT_MSG", "/MERGE_LIST"]);
}

#[test]
fn out_of_range_parent_is_an_invalid_key() {
    let (repo, ops) = service();
    let root = repo.commit(repo.write_tree(&[("f", b"1\n")]), &[], "root");
    let err = ops
        .list_modified_files_against_parent(&project(), &root, 1, &DiffOptions::default())
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidKey(_)));

    let listing = ops
        .list_modified_files_against_parent(&project(), &root, 0, &DiffOptions::default())
        .unwrap();
    assert_eq!(listing.comparison, ComparisonType::AgainstRoot);
    assert_eq!(paths(&listing.files), ["/COMMIT_MSG", "f"]);
}

/// Counts merges and slows them down so that callers overlap.
struct CountingStrategy {
    inner: Arc<dyn MergeStrategy>,
    merges: AtomicUsize,
}

impl MergeStrategy for CountingStrategy {
    fn kind(&self) -> MergeStrategyKind {
        self.inner.kind()
    }

    fn merge(
        &self,
        reader: &dyn ObjectReader,
        ours: &ContentId,
        theirs: &ContentId,
        options: &MergeOptions,
    ) -> Result<TreeMerge, MergeError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        self.inner.merge(reader, ours, theirs, options)
    }
}

#[test]
fn concurrent_auto_merge_requests_merge_once() {
    init_tracing();
    let manager = Arc::new(MemoryRepositoryManager::new());
    let repo = manager.create(&project());
    let Merge { merge, .. } = merge_commit(&repo);
    let strategy = Arc::new(CountingStrategy {
        inner: strategy_for(MergeStrategyKind::Recursive),
        merges: AtomicUsize::new(0),
    });
    let ops = Arc::new(
        DiffOperations::with_strategy(
            manager,
            config(),
            Arc::clone(&strategy) as Arc<dyn MergeStrategy>,
        )
        .unwrap(),
    );

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ops = Arc::clone(&ops);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ops.synthesize_auto_merge(&project(), &merge).unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(strategy.merges.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| w[0].commit == w[1].commit));
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

/// A strategy that always fails.
struct BrokenStrategy;

impl MergeStrategy for BrokenStrategy {
    fn kind(&self) -> MergeStrategyKind {
        MergeStrategyKind::Recursive
    }

    fn merge(
        &self,
        _: &dyn ObjectReader,
        _: &ContentId,
        _: &ContentId,
        _: &MergeOptions,
    ) -> Result<TreeMerge, MergeError> {
        Err(MergeError::UnsupportedParentCount(0))
    }
}

#[test]
fn failed_auto_merge_falls_back_to_first_parent() {
    init_tracing();
    let manager = Arc::new(MemoryRepositoryManager::new());
    let repo = manager.create(&project());
    let Merge { merge, left, .. } = merge_commit(&repo);
    let ops = DiffOperations::with_strategy(manager, config(), Arc::new(BrokenStrategy)).unwrap();

    let err = ops.synthesize_auto_merge(&project(), &merge).unwrap_err();
    assert!(matches!(err, CacheError::MergeUnavailable(_)));

    let listing = ops
        .list_modified_files_against_parent(&project(), &merge, 0, &DiffOptions::default())
        .unwrap();
    assert_eq!(listing.comparison, ComparisonType::AgainstParent(1));
    assert_eq!(listing.old_commit, Some(left));
    assert!(listing.files.contains_key(&BString::from("f")));
}

#[test]
fn diff_summary_of_root_commit_counts_every_line() {
    let (repo, ops) = service();
    let root = repo.commit(
        repo.write_tree(&[("a", b"1\n2\n"), ("dir/b", b"x\n")]),
        &[],
        "root",
    );
    let summary = ops
        .get_diff_summary(&project(), None, &root, Whitespace::IgnoreNone)
        .unwrap();
    assert_eq!(summary.paths, vec![BString::from("a"), BString::from("dir/b")]);
    assert_eq!((summary.insertions, summary.deletions), (3, 0));
}

#[test]
fn renamed_file_contributes_both_paths_to_summary() {
    let (repo, ops) = service();
    let content: &[u8] = b"line one\nline two\nline three\nline four\n";
    let old = repo.commit(repo.write_tree(&[("old.txt", content)]), &[], "old");
    let new = repo.commit(repo.write_tree(&[("new.txt", content)]), &[old], "new");

    let files = ops
        .list_modified_files(&project(), &old, &new, &DiffOptions::default())
        .unwrap();
    let renamed = &files[&BString::from("new.txt")];
    assert_eq!(renamed.change_kind, ChangeKind::Renamed);
    assert_eq!(renamed.old_path.as_ref().map(|p| p.to_string()), Some("old.txt".into()));

    let summary = ops
        .get_diff_summary(&project(), Some(&old), &new, Whitespace::IgnoreNone)
        .unwrap();
    assert_eq!(summary.paths, vec![BString::from("new.txt"), BString::from("old.txt")]);
    assert_eq!((summary.insertions, summary.deletions), (0, 0));
}

#[test]
fn persisted_layers_survive_a_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.cache.directory = Some(dir.path().to_path_buf());
    config.cache.file_diff.persist = true;

    let manager = Arc::new(MemoryRepositoryManager::new());
    let repo = manager.create(&project());
    let old = repo.commit(repo.write_tree(&[("f", b"1\n")]), &[], "old");
    let new = repo.commit(repo.write_tree(&[("f", b"2\n")]), &[old], "new");

    let first = {
        let ops = DiffOperations::new(manager.clone(), config.clone()).unwrap();
        let diff = ops
            .get_modified_file(&project(), &old, &new, b"f", &DiffOptions::default())
            .unwrap();
        ops.flush().unwrap();
        diff
    };

    let ops = DiffOperations::new(manager, config).unwrap();
    let second = ops
        .get_modified_file(&project(), &old, &new, b"f", &DiffOptions::default())
        .unwrap();
    assert_eq!(*first, *second);
    let file_stats = ops
        .cache_stats()
        .into_iter()
        .find(|(name, _)| *name == "file_diff")
        .map(|(_, stats)| stats)
        .unwrap();
    assert_eq!(file_stats.loads, 0);
    assert_eq!(ops.git_file_diffs().stats().loads, 0);
}

#[test]
fn single_file_against_chosen_parent() {
    let (repo, ops) = service();
    let Merge { merge, .. } = merge_commit(&repo);
    let options = DiffOptions::from_config(ops.config());

    let against_auto_merge = ops
        .get_modified_file_against_parent(&project(), &merge, 0, b"extra", &options)
        .unwrap();
    assert_eq!(against_auto_merge.comparison, ComparisonType::AgainstAutoMerge);
    assert_eq!(against_auto_merge.change_kind, ChangeKind::Added);
    assert_eq!(against_auto_merge.edits, vec![Edit::new(0, 0, 0, 1)]);

    let cleanly_merged = ops
        .get_modified_file_against_parent(&project(), &merge, 0, b"f", &options)
        .unwrap();
    assert!(cleanly_merged.is_empty());

    let against_second = ops
        .get_modified_file_against_parent(&project(), &merge, 2, b"f", &options)
        .unwrap();
    assert_eq!(against_second.comparison, ComparisonType::AgainstParent(2));
    assert_eq!(against_second.edits, vec![Edit::new(0, 1, 0, 1)]);
}

#[test]
fn summary_of_merge_shares_the_auto_merge_listing() {
    let (repo, ops) = service();
    let Merge { merge, .. } = merge_commit(&repo);
    let options = DiffOptions::from_config(ops.config());

    ops.list_modified_files_against_parent(&project(), &merge, 0, &options).unwrap();
    let listed = ops.modified_files().stats().loads;
    let diffed = ops.file_diffs().stats().loads;

    let summary = ops
        .get_diff_summary(&project(), None, &merge, options.whitespace)
        .unwrap();
    assert_eq!(summary.paths, vec![BString::from("extra")]);
    assert_eq!((summary.insertions, summary.deletions), (1, 0));
    assert_eq!(ops.modified_files().stats().loads, listed);
    assert_eq!(ops.file_diffs().stats().loads, diffed);
}

/// Lines `0..lines` with every tenth one changed on the new side.
fn many_lines(lines: usize) -> (Vec<u8>, Vec<u8>) {
    let mut old = Vec::new();
    let mut new = Vec::new();
    for i in 0..lines {
        old.extend_from_slice(format!("line {i}\n").as_bytes());
        if i % 10 == 0 {
            new.extend_from_slice(format!("changed {i}\n").as_bytes());
        } else {
            new.extend_from_slice(format!("line {i}\n").as_bytes());
        }
    }
    (old, new)
}

#[test]
fn timed_out_diff_is_cached_and_recomputed_with_fallback() {
    let mut config = config();
    config.diff.timeout_ms = 0;
    let (repo, ops) = service_with(config);
    let (old_text, new_text) = many_lines(20_000);
    let old_tree = repo.write_tree(&[("f", old_text.as_slice())]);
    let new_tree = repo.write_tree(&[("f", new_text.as_slice())]);
    let old = repo.commit(old_tree, &[], "old");
    let new = repo.commit(new_tree, &[old], "new");
    let options = DiffOptions::from_config(ops.config());

    let diff = ops
        .get_modified_file(&project(), &old, &new, b"f", &options)
        .unwrap();
    assert!(!diff.is_negative());
    assert_eq!(diff.algorithm, DiffAlgorithm::HistogramNoFallback);
    assert_eq!(
        diff.edits,
        FileDiffEngine::diff_text(
            &old_text,
            &new_text,
            DiffAlgorithm::HistogramNoFallback,
            options.whitespace,
        )
    );

    let budgeted = GitFileDiffKey {
        project: project(),
        old_tree: Some(old_tree),
        new_tree,
        path: "f".into(),
        rename_score: options.rename_score,
        algorithm: options.algorithm,
        whitespace: options.whitespace,
        use_timeout: true,
    };
    let negative = ops.git_file_diffs().get(&budgeted).unwrap();
    assert!(negative.is_negative());
    assert!(negative.edits.is_empty());
    assert_eq!(negative.new_path, Some(BString::from("f")));

    let git_loads = ops.git_file_diffs().stats().loads;
    let file_loads = ops.file_diffs().stats().loads;
    let again = ops
        .get_modified_file(&project(), &old, &new, b"f", &options)
        .unwrap();
    assert!(Arc::ptr_eq(&diff, &again));
    assert!(ops.git_file_diffs().get(&budgeted).unwrap().is_negative());
    let listed = ops
        .list_modified_files(&project(), &old, &new, &options)
        .unwrap();
    assert!(Arc::ptr_eq(&listed[&BString::from("f")], &diff));
    assert_eq!(ops.git_file_diffs().stats().loads, git_loads);
    assert_eq!(ops.file_diffs().stats().loads, file_loads);

    let refined = ops.get_intraline_diff(&project(), &diff, &options).unwrap();
    let fallback_key = IntraLineKey {
        project: project(),
        old_blob: diff.old_id.unwrap(),
        new_blob: diff.new_id.unwrap(),
        whitespace: options.whitespace,
        algorithm: DiffAlgorithm::HistogramNoFallback,
        rebase_edits: Vec::new(),
    };
    let cached = ops.intraline().get(&fallback_key, &[]).unwrap();
    assert!(Arc::ptr_eq(&refined, &cached));
    assert_eq!(ops.intraline().stats().loads, 1);
}
