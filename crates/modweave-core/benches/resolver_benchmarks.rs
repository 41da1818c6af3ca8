use criterion::{criterion_group, criterion_main, Criterion};
use modweave_core::{apply_order, resolve, Scans};
use modweave_schema::{PackageRecord, Registry, RegistryEntry};

/// `units` units of `per_unit` packages; every package requires the first
/// package of the previous unit and a few requirements point nowhere.
fn synthetic_registry(units: usize, per_unit: usize) -> Registry {
    let mut registry = Registry::default();
    for u in 0..units {
        let mut entry = RegistryEntry::new(format!("{}", 1000 + u));
        for p in 0..per_unit {
            let mut record = PackageRecord::placeholder(format!("mod_{u}_{p}"));
            record.enabled = true;
            if u > 0 {
                record.requires.push(format!("mod_{}_0", u - 1));
            }
            if p % 7 == 3 {
                record.requires.push(format!("absent_{u}"));
            }
            entry.mods.push(record);
        }
        registry.mods.push(entry);
    }
    // Reverse so the resolver has to reorder everything.
    registry.mods.reverse();
    registry
}

fn bench_resolve(c: &mut Criterion) {
    let registry = synthetic_registry(200, 5);
    let scans = Scans::new();
    c.bench_function("resolve_1000_mods", |b| {
        b.iter(|| resolve(&registry, &scans));
    });
}

fn bench_resolve_and_apply(c: &mut Criterion) {
    let scans = Scans::new();
    c.bench_function("resolve_apply_1000_mods", |b| {
        b.iter_with_setup(
            || synthetic_registry(200, 5),
            |mut registry| {
                let resolution = resolve(&registry, &scans);
                apply_order(&mut registry, &resolution);
            },
        );
    });
}

criterion_group!(benches, bench_resolve, bench_resolve_and_apply);
criterion_main!(benches);
