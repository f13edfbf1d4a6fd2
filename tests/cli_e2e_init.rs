//! End-to-end tests for the `init` and `import` commands.

mod common;
use common::prelude::*;

#[test]
fn test_init_creates_workspace() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("grove");
    cmd.current_dir(temp.path())
        .env_remove("GROVE_ROOT")
        .args(["init", "ws"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized grove workspace"));
    temp.child("ws/.grove_root")
        .assert(predicate::path::is_dir());
}

#[test]
fn test_import_then_update_checks_out_imported_projects() {
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

    fixture
        .command()
        .args(["import", "default.yaml"])
        .arg(manifests.url())
        .assert()
        .success();
    let written = std::fs::read_to_string(fixture.path(".grove_manifest")).unwrap();
    assert!(written.contains(&manifests.url()));

    // Importing the same manifest again keeps a single entry.
    fixture
        .command()
        .args(["import", "default.yaml"])
        .arg(manifests.url())
        .assert()
        .success();
    let again = std::fs::read_to_string(fixture.path(".grove_manifest")).unwrap();
    assert_eq!(again.matches("remote:").count(), 1);

    fixture.command().arg("update").assert().success();
    assert_eq!(git(&fixture.path("a"), &["rev-parse", "HEAD"]), r1);
    assert!(fixture.path("manifest/default.yaml").is_file());
}

#[test]
fn test_import_root_places_projects_under_directory() {
    let fixture = WorkspaceFixture::new();
    let manifests = fixture.remote("manifests");
    let alpha = fixture.remote("alpha");
    alpha.commit("README.md", "one");
    manifests.commit(
        "default.yaml",
        &format!(
            "projects:\n  - name: a\n    path: a\n    remote: {}\n",
            alpha.url()
        ),
    );

    fixture
        .command()
        .args(["import", "--import-root", "third_party", "default.yaml"])
        .arg(manifests.url())
        .assert()
        .success();
    fixture.command().arg("update").assert().success();
    assert!(fixture.path("third_party/manifest/default.yaml").is_file());
    assert!(fixture.path("third_party/a/README.md").is_file());
}
