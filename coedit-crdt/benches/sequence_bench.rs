use coedit_crdt::CharSequence;
use coedit_types::{ItemId, PeerId};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn typing(c: &mut Criterion) {
    let peer = PeerId::new();
    c.bench_function("append 1000 chars", |b| {
        b.iter(|| {
            let mut seq = CharSequence::new(ItemId::new(1, peer));
            for ts in 2..1002 {
                seq.insert_before_id(None, 'x', || ItemId::new(ts, peer))
                    .unwrap();
            }
            black_box(seq.len())
        })
    });

    c.bench_function("remote inserts at head", |b| {
        let source = {
            let mut seq = CharSequence::new(ItemId::new(1, peer));
            let mut anchor = None;
            let mut ops = Vec::new();
            for ts in 2..502 {
                let op = seq
                    .insert_before_id(anchor, 'y', || ItemId::new(ts, peer))
                    .unwrap();
                anchor = op.id;
                ops.push(op);
            }
            ops
        };
        b.iter(|| {
            let mut seq = CharSequence::new(ItemId::new(1, peer));
            for op in &source {
                seq.apply_operation(op).unwrap();
            }
            black_box(seq.text())
        })
    });
}

criterion_group!(benches, typing);
criterion_main!(benches);
