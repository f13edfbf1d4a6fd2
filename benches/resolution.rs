//! Benchmarks for manifest parsing, import-graph resolution and environment
//! merging.
//!
//! Resolution runs over local imports only, so no repository is touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use grove::envvar::{self, MergePolicies};
use grove::manifest::Manifest;
use grove::phases::resolve::{ManifestResolver, ResolveOptions};
use grove::repository::GitVersionControl;
use grove::workspace::Workspace;

/// A manifest declaring `count` projects, half pinned and half tracking.
fn manifest_text(prefix: &str, count: usize) -> String {
    let mut text = String::from("projects:\n");
    for i in 0..count {
        text.push_str(&format!(
            "  - name: {prefix}{i}\n    path: {prefix}/p{i}\n    remote: https://example.com/{prefix}/{i}.git\n"
        ));
        if i % 2 == 0 {
            text.push_str(&format!("    revision: {:040x}\n", i + 1));
        }
    }
    text
}

/// Writes a tree of local imports `depth` levels deep with `fanout` children
/// per manifest, all children of a level importing one shared manifest.
fn write_tree(root: &Path, depth: usize, fanout: usize) -> PathBuf {
    fs::write(root.join("shared.yaml"), manifest_text("shared", 10)).unwrap();
    write_level(root, "m", depth, fanout)
}

fn write_level(root: &Path, name: &str, depth: usize, fanout: usize) -> PathBuf {
    let path = root.join(format!("{name}.yaml"));
    let mut text = String::from("localimports:\n  - file: shared.yaml\n");
    if depth > 0 {
        for c in 0..fanout {
            let child = format!("{name}_{c}");
            write_level(root, &child, depth - 1, fanout);
            text.push_str(&format!("  - file: {child}.yaml\n"));
        }
    }
    text.push_str(&manifest_text(name, 5));
    fs::write(&path, text).unwrap();
    path
}

fn bench_manifest_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_parsing");
    for count in [10, 100, 1000] {
        let text = manifest_text("p", count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &text, |b, text| {
            b.iter(|| Manifest::parse(black_box(text), Path::new("bench.yaml")).unwrap())
        });
    }
    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    for (depth, fanout) in [(1, 4), (2, 4), (3, 3)] {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap();
        let entry = write_tree(&ws.root, depth, fanout);
        let opts = ResolveOptions {
            local_manifest: true,
            use_lockfiles: false,
            ignore_lock_conflicts: false,
        };
        group.bench_with_input(
            BenchmarkId::new("local_imports", format!("{depth}x{fanout}")),
            &entry,
            |b, entry| {
                b.iter(|| {
                    ManifestResolver::new(&ws, &GitVersionControl, opts)
                        .resolve(std::slice::from_ref(entry))
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_env_merge(c: &mut Criterion) {
    let policies: MergePolicies = "+CFLAGS,+CXXFLAGS,+LDFLAGS,:PATH,^GOROOT*".parse().unwrap();
    let base: BTreeMap<String, String> = (0..200)
        .map(|i| (format!("VAR_{i}"), format!("value-{i}")))
        .chain([
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("GOROOT".to_string(), "/go".to_string()),
        ])
        .collect();
    let overrides = envvar::parse_assignments(&["CFLAGS=-O2", "PATH=/opt/bin", "HOME=/h"]).unwrap();
    c.bench_function("env_merge", |b| {
        b.iter(|| envvar::merge(black_box(&base), black_box(&overrides), &policies))
    });
}

criterion_group!(
    benches,
    bench_manifest_parsing,
    bench_resolution,
    bench_env_merge
);
criterion_main!(benches);
