//! End-to-end tests for the `tree` command.

mod common;
use common::prelude::*;

#[test]
fn test_tree_help() {
    WorkspaceFixture::new()
        .command()
        .args(["tree", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Display the manifest import tree"));
}

#[test]
fn test_tree_shows_local_and_remote_imports() {
    let fixture = WorkspaceFixture::new();
    let manifests = fixture.remote("manifests");
    let alpha = fixture.remote("alpha");
    let r1 = alpha.commit("README.md", "one");
    manifests.commit(
        "default.yaml",
        &format!(
            "projects:\n  - name: a\n    path: a\n    remote: {}\n    revision: {}\n",
            alpha.url(),
            r1
        ),
    );
    fixture.write("local/extra.yaml", "projects: []\n");
    fixture.write_manifest(&format!(
        "imports:\n  - remote: {}\n    manifest: default.yaml\nlocalimports:\n  - file: local/extra.yaml\n",
        manifests.url()
    ));

    fixture
        .command()
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains(".grove_manifest"))
        .stdout(predicate::str::contains("manifest/default.yaml"))
        .stdout(predicate::str::contains("local/extra.yaml"));
    assert!(fixture.path("manifest/.git").is_dir());
}

#[test]
fn test_tree_depth_zero_shows_only_entry_manifest() {
    let fixture = WorkspaceFixture::new();
    fixture.write("local/extra.yaml", "projects: []\n");
    fixture.write_manifest("localimports:\n  - file: local/extra.yaml\n");

    fixture
        .command()
        .args(["tree", "--depth", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".grove_manifest"))
        .stdout(predicate::str::contains("extra.yaml").not());
}

#[test]
fn test_tree_reports_import_cycle() {
    let fixture = WorkspaceFixture::new();
    fixture.write("one.yaml", "localimports:\n  - file: two.yaml\n");
    fixture.write("two.yaml", "localimports:\n  - file: one.yaml\n");
    fixture.write_manifest("localimports:\n  - file: one.yaml\n");

    fixture
        .command()
        .arg("tree")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Import cycle detected"));
}
