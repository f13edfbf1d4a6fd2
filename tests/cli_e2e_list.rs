//! End-to-end tests for the `list` and `snapshot` commands.

mod common;
use common::prelude::*;

fn converged() -> (WorkspaceFixture, String, String) {
    let fixture = WorkspaceFixture::new();
    let alpha = fixture.remote("alpha");
    let beta = fixture.remote("beta");
    let r1 = alpha.commit("README.md", "one");
    alpha.commit("README.md", "two");
    let b_head = beta.commit("README.md", "beta");
    fixture.write_manifest(&pinned_and_tracked(&alpha, &r1, &beta));
    fixture.command().arg("update").assert().success();
    (fixture, r1, b_head)
}

#[test]
fn test_list_shows_branch_and_revision() {
    let (fixture, r1, _) = converged();
    fixture
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("a a (detached) {}", &r1[..12])))
        .stdout(predicate::str::contains("b src/b main"));
}

#[test]
fn test_list_dirty_only() {
    let (fixture, _, _) = converged();
    fixture.write("src/b/new-file.txt", "untracked");
    fixture
        .command()
        .args(["list", "--dirty"])
        .assert()
        .success()
        .stdout(predicate::str::contains("b src/b main"))
        .stdout(predicate::str::contains("a a").not());
}

#[test]
fn test_snapshot_pins_every_checkout() {
    let (fixture, r1, b_head) = converged();
    fixture
        .command()
        .args(["snapshot", "snap.yaml"])
        .assert()
        .success();
    let snap = std::fs::read_to_string(fixture.path("snap.yaml")).unwrap();
    assert!(snap.contains(&r1));
    assert!(snap.contains(&b_head));

    // The snapshot is a manifest: updating to it is a no-op.
    std::fs::copy(fixture.path("snap.yaml"), fixture.path(".grove_manifest")).unwrap();
    fixture
        .command()
        .arg("update")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 unchanged"));
}
