mod common;

use common::{device, key, mac};
use neigh_core::{NeighError, NudState, TableConfig, Tunables, UpdateFlags};
use std::time::Duration;

#[test]
fn fifth_create_over_hard_limit_collects() {
    let config = TableConfig::new().gc_thresholds(1, 2, 4);
    let (table, _clock, _events) = common::table(Tunables::new(), config);
    let dev = device(1);

    for host in 1..=5 {
        table.create(&key(host), &dev).unwrap();
        assert!(table.len() <= 4);
    }
    assert!(table.stats().forced_gc_runs >= 1);
    assert!(table.lookup(&key(5), &dev).is_some());
}

#[test]
fn soft_limit_collects_once_flush_interval_passed() {
    let config = TableConfig::new().gc_thresholds(1, 2, 16);
    let (table, clock, _events) = common::table(Tunables::new(), config);
    let dev = device(1);

    for host in 1..=3 {
        table.create(&key(host), &dev).unwrap();
    }
    assert_eq!(table.stats().forced_gc_runs, 0);

    clock.advance(Duration::from_secs(6));
    table.create(&key(4), &dev).unwrap();
    assert_eq!(table.stats().forced_gc_runs, 1);
    assert_eq!(table.len(), 1);
}

#[test]
fn referenced_entries_survive_every_collection() {
    let config = TableConfig::new().gc_thresholds(0, 2, 3);
    let (table, clock, _events) = common::table(Tunables::new(), config);
    let dev = device(1);

    let held = table.create(&key(1), &dev).unwrap();
    held.update(Some(&mac(1)), NudState::Stale, UpdateFlags::OVERRIDE)
        .unwrap();
    let permanent = table.create(&key(2), &dev).unwrap();
    permanent
        .update(
            Some(&mac(2)),
            NudState::Permanent,
            UpdateFlags::OVERRIDE | UpdateFlags::ADMIN,
        )
        .unwrap();
    drop(permanent);

    clock.advance(Duration::from_secs(600));
    table.periodic_work();
    table.forced_gc();
    assert_eq!(table.len(), 2);
    assert!(!held.is_dead());

    let third = table.create(&key(3), &dev).unwrap();
    match table.create(&key(4), &dev) {
        Err(NeighError::ResourceExhausted) => {}
        other => panic!("unexpected result {:?}", other),
    }
    drop(third);
}

#[test]
fn periodic_sweep_runs_from_poll() {
    let tunables = Tunables::new().base_reachable_time(Duration::from_secs(10));
    let config = TableConfig::new().gc_thresholds(0, 512, 1024);
    let (table, clock, _events) = common::table(tunables, config);
    let dev = device(1);

    let failed = table.create(&key(1), &dev).unwrap();
    failed
        .update(None, NudState::Failed, UpdateFlags::OVERRIDE)
        .unwrap();
    drop(failed);

    clock.advance(Duration::from_secs(15));
    table.poll();
    assert_eq!(table.stats().periodic_gc_runs, 1);
    assert!(table.is_empty());
}

#[test]
fn default_config_sweeps_failed_and_idle_entries() {
    let (table, clock, _events) = common::table(Tunables::new(), TableConfig::new());
    let dev = device(1);

    let failed = table.create(&key(1), &dev).unwrap();
    failed
        .update(None, NudState::Failed, UpdateFlags::OVERRIDE | UpdateFlags::ADMIN)
        .unwrap();
    drop(failed);

    let idle = table.create(&key(2), &dev).unwrap();
    idle.update(Some(&mac(2)), NudState::Stale, UpdateFlags::OVERRIDE)
        .unwrap();
    drop(idle);

    let held = table.create(&key(3), &dev).unwrap();

    table.periodic_work();
    assert_eq!(table.len(), 2);
    assert!(table.lookup(&key(1), &dev).is_none());

    clock.advance(Duration::from_secs(600));
    table.periodic_work();
    assert_eq!(table.len(), 1);
    assert!(table.lookup(&key(3), &dev).is_some());
    drop(held);
}
