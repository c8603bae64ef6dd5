use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lvmcache::entity::{VgStatus, VgSummary};
use lvmcache::ids::{DeviceId, Pvid, Vgid};
use lvmcache::index::Index;
use lvmcache::pipeline::update_pv;

fn summary(vgname: &str, vgid: &str) -> VgSummary {
    VgSummary {
        vgname: vgname.to_string(),
        vgid: Vgid::new(vgid),
        status: VgStatus::empty(),
        creation_host: None,
        lock_type: None,
        system_id: None,
        scan_summary: None,
    }
}

fn pipeline_throughput(c: &mut Criterion) {
    c.bench_function("pipeline_update_1000_pvs", |b| {
        b.iter(|| {
            let mut index = Index::new();
            let mut dups = Vec::new();
            for i in 0..1000u64 {
                let pvid = Pvid::new(&format!("p{i}"));
                let vgid = Vgid::new(&format!("v{}", i % 10));
                update_pv(
                    &mut index,
                    "host0",
                    pvid,
                    DeviceId(i),
                    None,
                    Some(&summary(&format!("vg{}", i % 10), &format!("v{}", i % 10))),
                    &mut dups,
                );
            }
            black_box(index.registry().len())
        })
    });
}

fn indexed_lookup(c: &mut Criterion) {
    let mut index = Index::new();
    let mut dups = Vec::new();
    for i in 0..10_000u64 {
        let pvid = Pvid::new(&format!("p{i}"));
        update_pv(&mut index, "host0", pvid, DeviceId(i), None, None, &mut dups);
    }

    c.bench_function("by_pvid_lookup", |b| {
        b.iter(|| black_box(index.pv_key_by_pvid(Pvid::new("p5000"))))
    });
}

fn duplicate_arbitration(c: &mut Criterion) {
    use lvmcache::duplicates::arbitrate;

    struct NullEnumerator;
    impl lvmcache::external::DeviceEnumerator for NullEnumerator {
        fn device_size(&self, _dev: DeviceId) -> Option<u64> {
            None
        }
        fn is_used_by_lv(&self, _dev: DeviceId) -> bool {
            false
        }
        fn has_mounted_fs(&self, _dev: DeviceId) -> bool {
            false
        }
        fn is_device_mapper(&self, _dev: DeviceId) -> bool {
            false
        }
        fn subsystem(&self, _dev: DeviceId) -> Option<String> {
            None
        }
        fn is_multi_device_subsystem(&self, _dev: DeviceId) -> bool {
            false
        }
    }

    let mut index = Index::new();
    let mut dups = Vec::new();
    update_pv(&mut index, "host0", Pvid::new("P"), DeviceId(1), None, None, &mut dups);

    let enumerator = NullEnumerator;
    let found: Vec<_> = (2..502u64).map(|i| (Pvid::new("P"), DeviceId(i))).collect();

    c.bench_function("arbitrate_500_duplicates", |b| {
        b.iter(|| black_box(arbitrate(&index, &enumerator, &found, &[])))
    });
}

criterion_group!(benches, pipeline_throughput, indexed_lookup, duplicate_arbitration);
criterion_main!(benches);
