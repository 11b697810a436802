//! End-to-end client-server benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pathscope_client::Client;
use pathscope_core::{RenderError, RenderSystem, Renderer, TraceSession};
use pathscope_protocol::{Camera, Color4f, Point3f, RenderInfo};
use pathscope_server::{Server, ServerConfig, SessionController};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Records a fixed-depth path per sample without doing any shading.
struct SyntheticRenderer {
    depth: i32,
    sample_count: i32,
}

impl Renderer for SyntheticRenderer {
    fn render_image(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn render_pixel(
        &mut self,
        x: i32,
        y: i32,
        sample_count: i32,
        trace: &mut TraceSession,
    ) -> Result<(), RenderError> {
        for sample in 0..sample_count {
            trace.set_sample_idx(sample);
            trace.set_path_origin(Point3f::new(x as f32, y as f32, 10.0));
            for depth in 0..self.depth {
                trace.set_depth_idx(depth);
                trace.set_intersection_pos(Point3f::new(x as f32, y as f32, depth as f32));
                trace.set_intersection_estimate(Color4f::rgb(0.5, 0.5, 0.5));
            }
            trace.set_final_estimate(Color4f::rgb(0.5, 0.5, 0.5));
        }
        Ok(())
    }

    fn send_render_information(&self, buf: &mut BytesMut) -> Result<(), RenderError> {
        RenderInfo {
            scene_name: "synthetic".to_string(),
            output_filepath: "/dev/null".to_string(),
            output_file_extension: "ppm".to_string(),
            sample_count: self.sample_count,
        }
        .encode(buf);
        Ok(())
    }

    fn send_camera_data(&self, buf: &mut BytesMut) -> Result<(), RenderError> {
        Camera::default().encode(buf);
        Ok(())
    }

    fn send_mesh_data(&self, _buf: &mut BytesMut) -> Result<(), RenderError> {
        Ok(())
    }

    fn update_sample_count(&mut self, sample_count: i32) {
        self.sample_count = sample_count;
    }
}

fn setup_server_and_client(rt: &Runtime) -> Client {
    let renderer = SyntheticRenderer {
        depth: 6,
        sample_count: 1,
    };
    let controller = SessionController::new(Box::new(renderer), RenderSystem::Custom);
    let server = Arc::new(Server::new(
        ServerConfig::new("127.0.0.1:0".parse().unwrap()),
        controller,
    ));

    rt.block_on(async {
        let addr = server.bind().await.unwrap();
        let server_clone = server.clone();
        tokio::spawn(async move {
            let _ = server_clone.run().await;
        });
        Client::connect(addr).await.unwrap()
    })
}

fn bench_render_info_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut client = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_render_info");
    group.throughput(Throughput::Elements(1));

    group.bench_function("query", |b| {
        b.iter(|| rt.block_on(async { black_box(client.request_render_info().await.unwrap()) }));
    });

    group.finish();
}

fn bench_render_pixel(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut client = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_render_pixel");

    for samples in [1, 16, 128] {
        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &samples, |b, &samples| {
            b.iter(|| {
                rt.block_on(async { black_box(client.render_pixel(3, 4, samples).await.unwrap()) })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render_info_latency, bench_render_pixel);
criterion_main!(benches);
