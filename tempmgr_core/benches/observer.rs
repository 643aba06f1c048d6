//! Model observer step cost; this runs inside every manager tick, so it has
//! to stay trivially cheap.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tempmgr_core::config::ModelCfg;
use tempmgr_core::model::{ModelParams, ModelRuntime};
use tempmgr_core::types::MODEL_R_SIZE;

fn observer_step(c: &mut Criterion) {
    let cfg = ModelCfg::default();
    let mut params = ModelParams::defaults(&cfg);
    params.c = 12.0;
    params.r = [20.0; MODEL_R_SIZE];

    let mut rt = ModelRuntime::default();
    rt.reset(&params, &cfg, 0.27, 64, 0, 25.0, 25.0);

    let mut temp = 25.0f32;
    c.bench_function("model_step", |b| {
        b.iter(|| {
            temp += 0.3;
            if temp > 250.0 {
                temp = 25.0;
            }
            rt.step(&params, &cfg, black_box(96), black_box(3), black_box(temp), 25.0);
            black_box(rt.residual())
        })
    });
}

criterion_group!(benches, observer_step);
criterion_main!(benches);
