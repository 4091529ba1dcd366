use criterion::{Bencher, BenchmarkId, Criterion, criterion_group, criterion_main};
use difftex::texture::*;

const TEX_SIZE: usize = 512;
const IMG_SIZE: usize = 512;

struct Setup {
    params: TextureParams,
    tex: Vec<f32>,
    uv: Vec<f32>,
    uv_da: Vec<f32>,
    dy: Vec<f32>,
    mips: Option<MipPyramid>,
}

impl Setup {
    fn new(filter_mode: FilterMode, channels: usize) -> Self {
        let params = TextureParams {
            filter_mode,
            boundary_mode: BoundaryMode::Wrap,
            enable_mip: filter_mode.is_mipmapped(),
            ..TextureParams::new(1, IMG_SIZE, IMG_SIZE, TEX_SIZE, TEX_SIZE, channels)
        };
        let tex: Vec<f32> = (0..params.tex_len()).map(|i| (i % 255) as f32 / 255.0).collect();
        // A slightly rotated view that minifies the texture by about 2.5x.
        let scale = 2.5 / IMG_SIZE as f32;
        let mut uv = Vec::with_capacity(params.pixel_count() * 2);
        let mut uv_da = Vec::with_capacity(params.pixel_count() * 4);
        for y in 0..IMG_SIZE {
            for x in 0..IMG_SIZE {
                uv.push((x as f32 + 0.3 * y as f32) * scale);
                uv.push((y as f32 - 0.3 * x as f32) * scale);
                uv_da.extend_from_slice(&[scale, 0.3 * scale, -0.3 * scale, scale]);
            }
        }
        let dy = vec![1.0; params.out_len()];
        let mips = params.enable_mip.then(|| MipPyramid::build(&params, &tex).unwrap());
        Setup { params, tex, uv, uv_da, dy, mips }
    }

    fn inputs(&self) -> SampleInputs<'_> {
        let inputs = SampleInputs::new(&self.tex, &self.uv);
        if self.params.enable_mip { inputs.with_uv_da(&self.uv_da) } else { inputs }
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let filters = [
        ("Nearest", FilterMode::Nearest),
        ("Linear", FilterMode::Linear),
        ("MipNearest", FilterMode::LinearMipmapNearest),
        ("MipLinear", FilterMode::LinearMipmapLinear),
    ];
    let setups: Vec<(&str, usize, Setup)> = filters
        .iter()
        .flat_map(|&(name, filter)| [(name, 1, Setup::new(filter, 1)), (name, 3, Setup::new(filter, 3))])
        .collect();

    fn forward(bencher: &mut Bencher, setup: &Setup) {
        let mut out = vec![0.0; setup.params.out_len()];
        bencher.iter(|| {
            texture_fwd_into(&setup.params, &setup.inputs(), setup.mips.as_ref(), &mut out).unwrap();
            std::hint::black_box(&out);
        })
    }
    fn backward(bencher: &mut Bencher, setup: &Setup) {
        bencher.iter(|| {
            std::hint::black_box(texture_grad(&setup.params, &setup.inputs(), setup.mips.as_ref(), &setup.dy).unwrap());
        })
    }

    let mut group = c.benchmark_group("Forward 512x512");
    for (name, channels, setup) in &setups {
        group.bench_with_input(BenchmarkId::new(*name, channels), setup, forward);
    }
    group.finish();

    let mut group = c.benchmark_group("Backward 512x512");
    for (name, channels, setup) in &setups {
        group.bench_with_input(BenchmarkId::new(*name, channels), setup, backward);
    }
    group.finish();

    let mut group = c.benchmark_group("Build mips");
    for channels in [1, 3] {
        let setup = Setup::new(FilterMode::LinearMipmapLinear, channels);
        group.bench_with_input(BenchmarkId::new("Box", channels), &setup, |bencher, setup| {
            bencher.iter(|| std::hint::black_box(MipPyramid::build(&setup.params, &setup.tex).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
