//! Full-pipeline runs against real schematic trees on disk.
//!
//! Every test drives [`schsync_engine::sync`] end to end through the
//! s-expression file store, then asserts on the report and on the exact
//! bytes left in the target directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use schsync_engine::{
    Conflict, GridPlacer, MatchStrategy, SyncError, SyncOptions, SyncReport, SyncStatus, sync,
};
use schsync_model::{Circuit, Component, Net, NetNode, Pin, Subcircuit};
use schsync_store::FileStore;
use tempfile::TempDir;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run(desired: &Circuit, dir: &Path) -> SyncReport {
    sync(
        desired,
        dir,
        &FileStore::new(),
        &GridPlacer::default(),
        &SyncOptions::default(),
    )
    .unwrap()
}

fn read_tree(dir: &Path) -> BTreeMap<PathBuf, String> {
    let mut tree = BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "schsync_sch") {
                let rel = path.strip_prefix(dir).unwrap().to_path_buf();
                tree.insert(rel, fs::read_to_string(&path).unwrap());
            }
        }
    }
    tree
}

fn root_text(dir: &Path) -> String {
    fs::read_to_string(dir.join("main.schsync_sch")).unwrap()
}

fn resistor(reference: &str, value: &str) -> Component {
    Component::new(reference, "Device:R")
        .with_value(value)
        .with_pins(vec![Pin::new("1"), Pin::new("2")])
}

/// Two resistors joined at MID, everything on the root sheet.
fn divider() -> Circuit {
    Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_component(resistor("R2", "22k"))
            .with_net(
                Net::local("MID", vec![])
                    .with_nodes([NetNode::new("R1", "2"), NetNode::new("R2", "1")]),
            ),
    )
}

#[test]
fn fresh_sync_then_resync_is_byte_identical() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let desired = divider();

    let first = run(&desired, dir.path());
    assert_eq!(first.status, SyncStatus::Applied);
    assert_eq!(first.added, vec!["R1", "R2"]);
    assert_eq!(first.touched_files, vec![PathBuf::from("main.schsync_sch")]);
    let before = read_tree(dir.path());
    assert_eq!(before.len(), 1);

    let second = run(&desired, dir.path());
    assert!(second.is_noop(), "{second:?}");
    assert_eq!(read_tree(dir.path()), before);
}

#[test]
fn moved_component_keeps_its_position() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let desired = divider();
    run(&desired, dir.path());

    let text = root_text(dir.path());
    assert!(text.contains("(at 25.4 25.4 0)"), "{text}");
    let moved = text.replacen("(at 25.4 25.4 0)", "(at 63.5 88.9 0)", 1);
    fs::write(dir.path().join("main.schsync_sch"), &moved).unwrap();

    let report = run(&desired, dir.path());
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(root_text(dir.path()), moved);
}

#[test]
fn renamed_component_is_matched_in_place() {
    init_logs();
    let dir = TempDir::new().unwrap();
    run(&divider(), dir.path());

    let renamed = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R5", "10k"))
            .with_component(resistor("R2", "22k"))
            .with_net(
                Net::local("MID", vec![])
                    .with_nodes([NetNode::new("R5", "2"), NetNode::new("R2", "1")]),
            ),
    );
    let report = run(&renamed, dir.path());

    assert!(report.added.is_empty());
    assert!(report.removed.is_empty());
    assert_eq!(report.renamed.len(), 1);
    assert_eq!(report.renamed[0].from, "R1");
    assert_eq!(report.renamed[0].to, "R5");
    assert_eq!(report.renamed[0].strategy, MatchStrategy::SignatureGroup);

    let text = root_text(dir.path());
    assert!(!text.contains("\"R1\""), "{text}");
    // The renamed symbol keeps the slot R1 occupied.
    assert!(text.contains("(reference \"R5\")"));
    assert!(text.contains("(at 25.4 25.4 0)"));
}

#[test]
fn net_rename_patches_labels_in_place() {
    init_logs();
    let dir = TempDir::new().unwrap();
    run(&divider(), dir.path());
    let before = root_text(dir.path());

    let renamed = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_component(resistor("R2", "22k"))
            .with_net(
                Net::local("MIDPOINT", vec![])
                    .with_nodes([NetNode::new("R1", "2"), NetNode::new("R2", "1")]),
            ),
    );
    let report = run(&renamed, dir.path());

    assert_eq!(report.net_changes.renamed.len(), 1);
    assert_eq!(report.net_changes.renamed[0].from, "MID");
    assert_eq!(report.net_changes.renamed[0].to, "MIDPOINT");
    // Only the name strings moved; layout, uuids and everything else kept
    // their exact bytes.
    assert_eq!(
        root_text(dir.path()),
        before.replace("\"MID\"", "\"MIDPOINT\"")
    );
}

#[test]
fn net_merge_collapses_to_the_desired_name() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let split = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_component(resistor("R2", "22k"))
            .with_net(Net::local("N1", vec![]).with_nodes([NetNode::new("R1", "2")]))
            .with_net(Net::local("N2", vec![]).with_nodes([NetNode::new("R2", "1")])),
    );
    run(&split, dir.path());

    let joined = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_component(resistor("R2", "22k"))
            .with_net(
                Net::local("N1", vec![])
                    .with_nodes([NetNode::new("R1", "2"), NetNode::new("R2", "1")]),
            ),
    );
    let report = run(&joined, dir.path());

    assert_eq!(report.net_changes.merged.len(), 1);
    assert_eq!(report.net_changes.merged[0].survivor, "N1");
    assert_eq!(report.net_changes.merged[0].absorbed, "N2");

    let text = root_text(dir.path());
    assert!(!text.contains("\"N2\""), "{text}");
    assert_eq!(text.matches("(label \"N1\"").count(), 2);
}

#[test]
fn detached_pin_loses_its_label() {
    init_logs();
    let dir = TempDir::new().unwrap();
    run(&divider(), dir.path());
    assert!(root_text(dir.path()).contains("(anchor \"R2\" \"1\")"));

    let detached = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_component(resistor("R2", "22k"))
            .with_net(Net::local("MID", vec![]).with_nodes([NetNode::new("R1", "2")])),
    );
    let report = run(&detached, dir.path());

    assert_eq!(report.net_changes.detached.len(), 1);
    assert_eq!(report.net_changes.detached[0].net, "MID");
    assert_eq!(report.net_changes.detached[0].node, NetNode::new("R2", "1"));
    assert!(!root_text(dir.path()).contains("(anchor \"R2\" \"1\")"));
}

#[test]
fn hier_ports_stay_paired_across_the_boundary() {
    init_logs();
    let dir = TempDir::new().unwrap();

    let crossing = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_child(Subcircuit::new("amp").with_component(resistor("R2", "22k")))
            .with_net(
                Net::local("SIG", vec![])
                    .with_nodes([NetNode::new("R1", "2"), NetNode::new("R2", "1")]),
            ),
    );
    let report = run(&crossing, dir.path());
    assert_eq!(report.net_changes.ports_added.len(), 1);
    assert_eq!(report.net_changes.ports_added[0].sheet, vec!["amp"]);
    assert_eq!(report.net_changes.ports_added[0].port, "SIG");

    let child = fs::read_to_string(dir.path().join("amp.schsync_sch")).unwrap();
    assert!(child.contains("(hier_label \"SIG\""), "{child}");
    let root = root_text(dir.path());
    assert!(root.contains("(pin \"SIG\""), "{root}");

    // Pull the net back inside the root sheet; both halves of the port go.
    let local = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_child(Subcircuit::new("amp").with_component(resistor("R2", "22k")))
            .with_net(Net::local("SIG", vec![]).with_nodes([NetNode::new("R1", "2")])),
    );
    let report = run(&local, dir.path());
    assert_eq!(report.net_changes.ports_removed.len(), 1);

    let child = fs::read_to_string(dir.path().join("amp.schsync_sch")).unwrap();
    assert!(!child.contains("hier_label"), "{child}");
    assert!(!root_text(dir.path()).contains("(pin \"SIG\""));
}

#[test]
fn user_added_symbols_survive_syncs() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let desired = divider();
    run(&desired, dir.path());

    // Splice a hand-drawn capacitor into the root sheet, off-style
    // formatting included.
    let mut text = root_text(dir.path());
    let insert = text.rfind(')').unwrap();
    text.insert_str(
        insert,
        "(symbol (lib_id \"Device:C\") (reference \"C7\") (value \"100n\") (at 101.6 50.8 0) (uuid \"5f122a9c-0d24-4f0b-a587-2b60d7c2c343\") (pin \"1\") (pin \"2\"))\n",
    );
    fs::write(dir.path().join("main.schsync_sch"), &text).unwrap();

    for _ in 0..3 {
        let report = run(&desired, dir.path());
        assert_eq!(report.preserved, vec!["C7"]);
        assert_eq!(
            root_text(dir.path()),
            text,
            "hand edit must survive untouched"
        );
    }
}

#[test]
fn empty_subcircuits_round_trip() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let desired = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_child(Subcircuit::new("spare")),
    );

    let first = run(&desired, dir.path());
    assert_eq!(first.status, SyncStatus::Applied);
    let tree = read_tree(dir.path());
    assert_eq!(tree.len(), 2);
    assert!(tree.contains_key(Path::new("spare.schsync_sch")));

    let second = run(&desired, dir.path());
    assert!(second.is_noop(), "{second:?}");
    assert_eq!(read_tree(dir.path()), tree);
}

#[test]
fn duplicate_references_are_rejected_before_any_write() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let broken = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_child(Subcircuit::new("amp").with_component(resistor("R1", "22k"))),
    );

    let err = sync(
        &broken,
        dir.path(),
        &FileStore::new(),
        &GridPlacer::default(),
        &SyncOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SyncError::Validation(_)), "{err}");
    assert!(read_tree(dir.path()).is_empty());
}

#[test]
fn stale_generated_symbols_are_deleted_from_the_file() {
    init_logs();
    let dir = TempDir::new().unwrap();
    run(&divider(), dir.path());

    let slim = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_net(Net::local("MID", vec![]).with_nodes([NetNode::new("R1", "2")])),
    );
    let report = run(&slim, dir.path());

    assert_eq!(report.removed, vec!["R2"]);
    let text = root_text(dir.path());
    assert!(!text.contains("\"R2\""), "{text}");
}

#[test]
fn failed_commits_roll_back_to_prior_bytes() {
    init_logs();
    let dir = TempDir::new().unwrap();
    // A plain file squatting on the directory a child sheet needs makes the
    // commit fail partway: the root sheet goes in first, then the child
    // write blows up.
    fs::write(dir.path().join("sub"), "in the way").unwrap();

    let desired = Circuit::with_root(
        Subcircuit::new("").with_component(resistor("R1", "10k")).with_child(
            Subcircuit::new("amp")
                .with_component(resistor("R2", "22k"))
                .with_file(PathBuf::from("sub/amp.schsync_sch")),
        ),
    );
    let err = sync(
        &desired,
        dir.path(),
        &FileStore::new(),
        &GridPlacer::default(),
        &SyncOptions::default(),
    )
    .unwrap_err();

    assert!(
        matches!(
            err,
            SyncError::PartialApply {
                committed: 1,
                restored: 1,
                ..
            }
        ),
        "{err}"
    );
    assert!(read_tree(dir.path()).is_empty(), "rollback must clear the root sheet");
    assert_eq!(
        fs::read_to_string(dir.path().join("sub")).unwrap(),
        "in the way"
    );
}

#[test]
fn dry_runs_write_nothing() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };

    let report = sync(
        &divider(),
        dir.path(),
        &FileStore::new(),
        &GridPlacer::default(),
        &options,
    )
    .unwrap();

    assert_eq!(report.status, SyncStatus::DryRun);
    assert_eq!(report.added, vec!["R1", "R2"]);
    assert_eq!(report.touched_files, vec![PathBuf::from("main.schsync_sch")]);
    assert!(read_tree(dir.path()).is_empty());
}

#[test]
fn hand_edited_fields_are_overridden_and_reported() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let desired = divider();
    run(&desired, dir.path());

    let text = root_text(dir.path()).replacen("(value \"10k\")", "(value \"47k\")", 1);
    fs::write(dir.path().join("main.schsync_sch"), &text).unwrap();

    let report = run(&desired, dir.path());
    assert_eq!(report.status, SyncStatus::AppliedWithConflicts);
    assert!(
        matches!(
            report.conflicts.as_slice(),
            [Conflict::FieldOverride { reference, field, existing, desired }]
                if reference == "R1" && field == "value" && existing == "47k" && desired == "10k"
        ),
        "{:?}",
        report.conflicts
    );
    assert!(root_text(dir.path()).contains("(value \"10k\")"));
}

#[test]
fn shared_sheet_definitions_are_written_once() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let desired = Circuit::with_root(
        Subcircuit::new("")
            .with_child(Subcircuit::new("left").with_file(PathBuf::from("channel.schsync_sch")))
            .with_child(Subcircuit::new("right").with_file(PathBuf::from("channel.schsync_sch"))),
    );

    let first = run(&desired, dir.path());
    assert_eq!(first.status, SyncStatus::Applied);
    let tree = read_tree(dir.path());
    assert_eq!(tree.len(), 2);
    assert!(tree.contains_key(Path::new("channel.schsync_sch")));
    assert_eq!(root_text(dir.path()).matches("(sheet").count(), 2);

    let second = run(&desired, dir.path());
    assert!(second.is_noop(), "{second:?}");
}

#[test]
fn power_rails_survive_losing_their_members() {
    init_logs();
    let dir = TempDir::new().unwrap();
    let powered = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_net(Net::global("GND").with_nodes([NetNode::new("R1", "1")])),
    );
    run(&powered, dir.path());
    assert!(root_text(dir.path()).contains("(power_symbol"));

    let drained = Circuit::with_root(
        Subcircuit::new("")
            .with_component(resistor("R1", "10k"))
            .with_net(Net::global("GND")),
    );
    let report = run(&drained, dir.path());

    assert_eq!(report.net_changes.detached.len(), 1);
    let text = root_text(dir.path());
    assert!(text.contains("(power_symbol"), "{text}");
    assert!(!text.contains("(anchor \"R1\" \"1\")"));
}
