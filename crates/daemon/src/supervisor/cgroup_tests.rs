// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn create_makes_group_directory() {
    let root = tempfile::tempdir().unwrap();
    let cgroup = Cgroup::create(root.path(), "pool").unwrap();
    assert!(cgroup.path().is_dir());
    assert_eq!(cgroup.path(), root.path().join("pool"));
}

#[test]
fn cpu_limit_writes_quota_and_period() {
    let root = tempfile::tempdir().unwrap();
    let cgroup = Cgroup::create(root.path(), "pool").unwrap();

    cgroup.apply_cpu(50).unwrap();

    let written = std::fs::read_to_string(cgroup.path().join("cpu.max")).unwrap();
    assert_eq!(written, "50000 100000\n");
}

#[test]
fn memory_limit_writes_bytes() {
    let root = tempfile::tempdir().unwrap();
    let cgroup = Cgroup::create(root.path(), "pool").unwrap();

    cgroup.apply_memory(64 * 1024 * 1024).unwrap();

    let written = std::fs::read_to_string(cgroup.path().join("memory.max")).unwrap();
    assert_eq!(written, "67108864\n");
}

#[test]
fn zero_limits_touch_nothing() {
    let root = tempfile::tempdir().unwrap();
    let cgroup = Cgroup::create(root.path(), "pool").unwrap();

    cgroup.apply(&CgroupPolicy::default()).unwrap();

    assert!(!cgroup.path().join("cpu.max").exists());
    assert!(!cgroup.path().join("memory.max").exists());
}

#[test]
fn attach_appends_pids() {
    let root = tempfile::tempdir().unwrap();
    let cgroup = Cgroup::create(root.path(), "pool").unwrap();
    // the kernel provides cgroup.procs; a plain directory needs it seeded
    std::fs::write(cgroup.path().join("cgroup.procs"), "").unwrap();

    cgroup.attach(100).unwrap();
    cgroup.attach(200).unwrap();

    let written = std::fs::read_to_string(cgroup.path().join("cgroup.procs")).unwrap();
    assert_eq!(written, "100\n200\n");
}

#[test]
fn drop_removes_empty_group() {
    let root = tempfile::tempdir().unwrap();
    let path = {
        let cgroup = Cgroup::create(root.path(), "pool").unwrap();
        cgroup.path().to_path_buf()
    };
    assert!(!path.exists());
}

#[test]
fn drop_leaves_busy_group_in_place() {
    let root = tempfile::tempdir().unwrap();
    let path = {
        let cgroup = Cgroup::create(root.path(), "pool").unwrap();
        std::fs::write(cgroup.path().join("cgroup.procs"), "1\n").unwrap();
        cgroup.path().to_path_buf()
    };
    // a non-empty directory cannot be removed; the handle must not panic
    assert!(path.exists());
}
