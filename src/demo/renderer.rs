use bytes::BytesMut;
use parking_lot::Mutex;
use pathscope_core::{RenderError, Renderer, TraceSession};
use pathscope_protocol::{Camera, Color4f, Point2i, Point3f, RenderInfo, Sphere, Vec3f};
use pathscope_server::DemoConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::io::Write;
use std::path::Path;

const EPSILON: f32 = 1e-3;

/// Distance at which escaped rays are reported as environment hits.
const ENVMAP_DISTANCE: f32 = 100.0;

#[derive(Debug, Clone, Copy)]
struct SceneSphere {
    sphere: Sphere,
    emission: Color4f,
}

impl SceneSphere {
    fn diffuse(center: Point3f, radius: f32, albedo: Color4f) -> Self {
        let mut sphere = Sphere::new(center, radius);
        sphere.diffuse = albedo;
        Self {
            sphere,
            emission: Color4f::BLACK,
        }
    }

    fn is_emitter(&self) -> bool {
        self.emission.max_component() > 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f32,
    point: Point3f,
    normal: Vec3f,
    object: usize,
}

/// One vertex of a traced path, kept until the path is recorded.
#[derive(Debug, Default, Clone, Copy)]
struct Bounce {
    position: Option<Point3f>,
    next_event: Option<(Point3f, bool)>,
    envmap: Option<Point3f>,
    estimate: Color4f,
    object: Option<i32>,
    cos_theta: Option<f32>,
}

#[derive(Debug)]
struct PathLog {
    origin: Point3f,
    direction: Vec3f,
    bounces: Vec<Bounce>,
    radiance: Color4f,
}

impl PathLog {
    fn record(&self, sample_idx: i32, pixel: Point2i, trace: &mut TraceSession) {
        trace.set_sample_idx(sample_idx);
        trace.set_path_origin(self.origin);
        trace.add_path_data("pixel", pixel);
        trace.add_path_data("direction", self.direction);

        for (depth, bounce) in self.bounces.iter().enumerate() {
            trace.set_depth_idx(depth as i32);
            if let Some(position) = bounce.position {
                trace.set_intersection_pos(position);
            }
            if let Some((position, occluded)) = bounce.next_event {
                trace.set_next_event_estimation_pos(position, occluded);
            }
            if let Some(position) = bounce.envmap {
                trace.set_intersection_pos_envmap(position);
            }
            trace.set_intersection_estimate(bounce.estimate);
            if let Some(object) = bounce.object {
                trace.add_intersection_data("object", object);
            }
            if let Some(cos_theta) = bounce.cos_theta {
                trace.add_intersection_data("cos_theta", cos_theta);
            }
        }

        trace.set_final_estimate(self.radiance);
    }
}

/// Diffuse path tracer with next-event estimation towards a single
/// spherical light.
///
/// Every sample draws from its own RNG seeded by pixel and sample index, so
/// tracing a pixel reproduces exactly the paths that contributed to the
/// rendered image at the same sample count.
#[derive(Debug)]
pub struct DemoRenderer {
    config: DemoConfig,
    sample_count: i32,
    camera: Camera,
    objects: Vec<SceneSphere>,
    light: usize,
}

impl DemoRenderer {
    pub fn new(config: DemoConfig) -> Self {
        let origin = Point3f::new(0.0, 1.4, 6.0);
        let target = Point3f::new(0.0, 0.8, 0.0);
        let camera = Camera {
            near_clip: 0.01,
            far_clip: 1000.0,
            focus_dist: (target - origin).length(),
            fov: 40.0,
            up: Vec3f::new(0.0, 1.0, 0.0),
            dir: (target - origin).normalized(),
            origin,
        };

        let mut light = SceneSphere::diffuse(
            Point3f::new(0.0, 5.0, 1.0),
            1.0,
            Color4f::rgb(1.0, 1.0, 1.0),
        );
        light.emission = Color4f::rgb(12.0, 11.0, 10.0);

        let objects = vec![
            SceneSphere::diffuse(
                Point3f::new(0.0, -100.0, 0.0),
                100.0,
                Color4f::rgb(0.75, 0.75, 0.7),
            ),
            SceneSphere::diffuse(
                Point3f::new(-1.6, 0.8, 0.0),
                0.8,
                Color4f::rgb(0.8, 0.25, 0.2),
            ),
            SceneSphere::diffuse(
                Point3f::new(0.0, 1.0, -0.6),
                1.0,
                Color4f::rgb(0.85, 0.85, 0.85),
            ),
            SceneSphere::diffuse(
                Point3f::new(1.6, 0.6, 0.4),
                0.6,
                Color4f::rgb(0.2, 0.35, 0.8),
            ),
            light,
        ];

        Self {
            sample_count: config.sample_count,
            config,
            camera,
            light: objects.len() - 1,
            objects,
        }
    }

    pub fn sample_count(&self) -> i32 {
        self.sample_count
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.config.width && (y as u32) < self.config.height
    }

    fn primary_ray(&self, x: i32, y: i32, jitter: (f32, f32)) -> (Point3f, Vec3f) {
        let width = self.config.width as f32;
        let height = self.config.height as f32;
        let scale = (self.camera.fov.to_radians() * 0.5).tan();
        let px = (2.0 * (x as f32 + jitter.0) / width - 1.0) * (width / height) * scale;
        let py = (1.0 - 2.0 * (y as f32 + jitter.1) / height) * scale;

        let forward = self.camera.dir;
        let right = forward.cross(self.camera.up).normalized();
        let up = right.cross(forward);
        let dir = (forward + right * px + up * py).normalized();
        (self.camera.origin, dir)
    }

    fn intersect(&self, origin: Point3f, dir: Vec3f) -> Option<Hit> {
        let mut nearest: Option<Hit> = None;
        for (index, object) in self.objects.iter().enumerate() {
            let sphere = &object.sphere;
            let oc = origin - sphere.center;
            let b = oc.dot(dir);
            let c = oc.dot(oc) - sphere.radius * sphere.radius;
            let discriminant = b * b - c;
            if discriminant < 0.0 {
                continue;
            }
            let root = discriminant.sqrt();
            let mut t = -b - root;
            if t < EPSILON {
                t = -b + root;
            }
            if t < EPSILON || nearest.is_some_and(|hit| hit.t <= t) {
                continue;
            }
            let point = origin + dir * t;
            nearest = Some(Hit {
                t,
                point,
                normal: (point - sphere.center) * (1.0 / sphere.radius),
                object: index,
            });
        }
        nearest
    }

    /// Samples a point on the light and returns it with its visibility and
    /// the direct contribution at `point` before path throughput.
    fn sample_light(
        &self,
        point: Point3f,
        normal: Vec3f,
        albedo: Color4f,
        rng: &mut StdRng,
    ) -> (Point3f, bool, Color4f) {
        let light = &self.objects[self.light];
        let target = light.sphere.center + random_unit_vector(rng) * light.sphere.radius;
        let to_light = target - point;
        let distance = to_light.length();
        let l = to_light * (1.0 / distance);

        let visible = matches!(
            self.intersect(point + normal * EPSILON, l),
            Some(hit) if hit.object == self.light && hit.t >= distance - 1e-2
        );
        if !visible {
            return (target, true, Color4f::BLACK);
        }

        let light_normal = (target - light.sphere.center).normalized();
        let cos_surface = normal.dot(l);
        let cos_light = -light_normal.dot(l);
        if cos_surface <= 0.0 || cos_light <= 0.0 {
            return (target, false, Color4f::BLACK);
        }

        let area = 4.0 * PI * light.sphere.radius * light.sphere.radius;
        let geometry = cos_surface * cos_light * area / (PI * distance * distance);
        (
            target,
            false,
            albedo.modulate(light.emission).scale(geometry),
        )
    }

    fn trace_path(&self, origin: Point3f, dir: Vec3f, rng: &mut StdRng) -> PathLog {
        let mut log = PathLog {
            origin,
            direction: dir,
            bounces: Vec::new(),
            radiance: Color4f::BLACK,
        };
        let mut throughput = Color4f::rgb(1.0, 1.0, 1.0);
        let (mut origin, mut dir) = (origin, dir);

        for depth in 0..self.config.max_depth {
            let Some(hit) = self.intersect(origin, dir) else {
                let estimate = throughput.modulate(sky(dir));
                log.radiance = log.radiance.add_rgb(estimate);
                log.bounces.push(Bounce {
                    envmap: Some(origin + dir * ENVMAP_DISTANCE),
                    estimate,
                    ..Default::default()
                });
                break;
            };

            let object = &self.objects[hit.object];
            let mut bounce = Bounce {
                position: Some(hit.point),
                object: Some(hit.object as i32),
                ..Default::default()
            };

            // Lights reached after the first bounce are already counted by
            // next-event estimation.
            if object.is_emitter() {
                if depth == 0 {
                    bounce.estimate = throughput.modulate(object.emission);
                    log.radiance = log.radiance.add_rgb(bounce.estimate);
                }
                log.bounces.push(bounce);
                break;
            }

            let normal = if hit.normal.dot(dir) > 0.0 {
                -hit.normal
            } else {
                hit.normal
            };
            let (target, occluded, direct) =
                self.sample_light(hit.point, normal, object.sphere.diffuse, rng);
            bounce.next_event = Some((target, occluded));
            bounce.estimate = throughput.modulate(direct);
            log.radiance = log.radiance.add_rgb(bounce.estimate);

            let next = cosine_sample(normal, rng);
            bounce.cos_theta = Some(next.dot(normal));
            log.bounces.push(bounce);

            throughput = throughput.modulate(object.sphere.diffuse);
            origin = hit.point + normal * EPSILON;
            dir = next;
        }

        log
    }

    fn trace_sample(&self, x: i32, y: i32, sample_idx: i32) -> PathLog {
        let mut rng = sample_rng(x, y, sample_idx);
        let jitter = (rng.gen::<f32>(), rng.gen::<f32>());
        let (origin, dir) = self.primary_ray(x, y, jitter);
        self.trace_path(origin, dir, &mut rng)
    }

    fn pixel_color(&self, x: i32, y: i32) -> Color4f {
        let samples = self.sample_count.max(1);
        let sum = (0..samples).fold(Color4f::BLACK, |acc, sample| {
            acc.add_rgb(self.trace_sample(x, y, sample).radiance)
        });
        sum.scale(1.0 / samples as f32)
    }

    fn write_ppm(&self, path: &Path, pixels: &[u8]) -> Result<(), RenderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        write!(file, "P6\n{} {}\n255\n", self.config.width, self.config.height)?;
        file.write_all(pixels)?;
        file.flush()?;
        Ok(())
    }
}

impl Renderer for DemoRenderer {
    fn render_image(&mut self) -> Result<(), RenderError> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let workers = worker_count(height);
        let rows_per_worker = height.div_ceil(workers);
        let mut pixels = vec![0u8; width * height * 3];

        let this = &*self;
        std::thread::scope(|scope| {
            for (chunk_idx, chunk) in pixels.chunks_mut(rows_per_worker * width * 3).enumerate() {
                scope.spawn(move || {
                    let first = chunk_idx * rows_per_worker * width;
                    for (i, rgb) in chunk.chunks_exact_mut(3).enumerate() {
                        let index = first + i;
                        let (x, y) = ((index % width) as i32, (index / width) as i32);
                        rgb.copy_from_slice(&to_rgb8(this.pixel_color(x, y)));
                    }
                });
            }
        });

        self.write_ppm(&self.config.output_path, &pixels)?;
        tracing::info!(
            "rendered {}x{} at {} spp to {}",
            width,
            height,
            self.sample_count,
            self.config.output_path.display()
        );
        Ok(())
    }

    fn render_pixel(
        &mut self,
        x: i32,
        y: i32,
        sample_count: i32,
        trace: &mut TraceSession,
    ) -> Result<(), RenderError> {
        if !self.contains(x, y) {
            return Err(RenderError::failed(format!(
                "pixel ({}, {}) is outside the {}x{} image",
                x, y, self.config.width, self.config.height
            )));
        }
        if sample_count <= 0 {
            return Ok(());
        }

        let workers = worker_count(sample_count as usize);
        let trace = Mutex::new(trace);
        let this = &*self;
        std::thread::scope(|scope| {
            for worker in 0..workers {
                let trace = &trace;
                scope.spawn(move || {
                    for sample_idx in (worker as i32..sample_count).step_by(workers) {
                        let log = this.trace_sample(x, y, sample_idx);
                        let mut trace = trace.lock();
                        log.record(sample_idx, Point2i::new(x, y), &mut **trace);
                    }
                });
            }
        });

        tracing::debug!("traced {} samples for pixel ({}, {})", sample_count, x, y);
        Ok(())
    }

    fn send_render_information(&self, buf: &mut BytesMut) -> Result<(), RenderError> {
        let output = &self.config.output_path;
        let info = RenderInfo {
            scene_name: self.config.scene_name.clone(),
            output_filepath: output.with_extension("").display().to_string(),
            output_file_extension: output
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("ppm")
                .to_string(),
            sample_count: self.sample_count,
        };
        info.encode(buf);
        Ok(())
    }

    fn send_camera_data(&self, buf: &mut BytesMut) -> Result<(), RenderError> {
        self.camera.encode(buf);
        Ok(())
    }

    fn send_mesh_data(&self, buf: &mut BytesMut) -> Result<(), RenderError> {
        for object in &self.objects {
            object.sphere.encode(buf);
        }
        Ok(())
    }

    fn update_sample_count(&mut self, sample_count: i32) {
        if sample_count <= 0 {
            tracing::warn!("ignoring non-positive sample count {}", sample_count);
            return;
        }
        tracing::info!("sample count {} -> {}", self.sample_count, sample_count);
        self.sample_count = sample_count;
    }
}

fn worker_count(jobs: usize) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    cores.min(jobs).max(1)
}

fn sample_rng(x: i32, y: i32, sample_idx: i32) -> StdRng {
    let seed = (u64::from(x as u32) << 42) ^ (u64::from(y as u32) << 21) ^ u64::from(sample_idx as u32);
    StdRng::seed_from_u64(seed)
}

fn random_unit_vector(rng: &mut StdRng) -> Vec3f {
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let phi = rng.gen::<f32>() * 2.0 * PI;
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

/// Cosine-weighted direction on the hemisphere around `normal`.
fn cosine_sample(normal: Vec3f, rng: &mut StdRng) -> Vec3f {
    let phi = 2.0 * PI * rng.gen::<f32>();
    let r2: f32 = rng.gen();
    let r = r2.sqrt();

    let helper = if normal.x.abs() > 0.9 {
        Vec3f::new(0.0, 1.0, 0.0)
    } else {
        Vec3f::new(1.0, 0.0, 0.0)
    };
    let u = helper.cross(normal).normalized();
    let v = normal.cross(u);
    (u * (phi.cos() * r) + v * (phi.sin() * r) + normal * (1.0 - r2).sqrt()).normalized()
}

fn sky(dir: Vec3f) -> Color4f {
    let t = 0.5 * (dir.y + 1.0);
    Color4f::rgb(1.0, 1.0, 1.0)
        .scale(1.0 - t)
        .add_rgb(Color4f::rgb(0.5, 0.7, 1.0).scale(t))
        .scale(0.3)
}

fn to_rgb8(color: Color4f) -> [u8; 3] {
    let channel = |c: f32| (c.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0 + 0.5) as u8;
    [channel(color.r), channel(color.g), channel(color.b)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathscope_protocol::{Opcode, SceneObject, WireRead};

    fn small_config() -> DemoConfig {
        DemoConfig {
            width: 8,
            height: 6,
            sample_count: 2,
            max_depth: 3,
            ..DemoConfig::default()
        }
    }

    fn read_opcode(buf: &mut &[u8]) -> Opcode {
        buf.get_wire::<Opcode>().unwrap()
    }

    #[test]
    fn test_escaped_ray_hits_envmap() {
        let renderer = DemoRenderer::new(small_config());
        let mut rng = sample_rng(0, 0, 0);
        let log = renderer.trace_path(
            Point3f::new(0.0, 50.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            &mut rng,
        );
        assert_eq!(log.bounces.len(), 1);
        let bounce = log.bounces[0];
        assert!(bounce.position.is_none());
        assert_eq!(bounce.envmap.unwrap().y, 50.0 + ENVMAP_DISTANCE);
        assert!(log.radiance.max_component() > 0.0);
    }

    #[test]
    fn test_first_hit_records_next_event() {
        let renderer = DemoRenderer::new(small_config());
        let mut rng = sample_rng(0, 0, 0);
        let log = renderer.trace_path(
            Point3f::new(0.0, 1.0, 6.0),
            Vec3f::new(0.0, 0.0, -1.0),
            &mut rng,
        );
        let first = log.bounces[0];
        let position = first.position.unwrap();
        assert!((position.z - 0.4).abs() < 1e-3);
        assert_eq!(first.object, Some(2));
        assert!(first.next_event.is_some());
        assert!(first.cos_theta.unwrap() >= 0.0);
        assert!(log.bounces.len() <= 3);
    }

    #[test]
    fn test_light_seen_directly() {
        let renderer = DemoRenderer::new(small_config());
        let mut rng = sample_rng(0, 0, 0);
        let log = renderer.trace_path(
            Point3f::new(0.0, 5.0, 6.0),
            Vec3f::new(0.0, 0.0, -1.0),
            &mut rng,
        );
        assert_eq!(log.bounces.len(), 1);
        assert_eq!(log.bounces[0].object, Some(renderer.light as i32));
        assert_eq!(log.radiance, Color4f::rgb(12.0, 11.0, 10.0));
    }

    #[test]
    fn test_render_pixel_records_every_sample() {
        let mut renderer = DemoRenderer::new(small_config());
        let mut trace = TraceSession::new();
        trace.enable();
        renderer.render_pixel(4, 3, 5, &mut trace).unwrap();

        assert_eq!(trace.len(), 5);
        for (idx, path) in trace.paths().enumerate() {
            assert_eq!(path.sample_idx, idx as i32);
            assert_eq!(path.origin, renderer.camera.origin);
            assert!(path.final_estimate.is_some());
            assert!(!path.segments.is_empty());
            assert_eq!(path.fields.point2i.get("pixel"), Some(&vec![Point2i::new(4, 3)]));
        }
    }

    #[test]
    fn test_render_pixel_is_reproducible() {
        let mut renderer = DemoRenderer::new(small_config());
        let mut first = TraceSession::new();
        first.enable();
        renderer.render_pixel(2, 2, 3, &mut first).unwrap();

        let mut second = TraceSession::new();
        second.enable();
        renderer.render_pixel(2, 2, 3, &mut second).unwrap();

        let a: Vec<_> = first.paths().map(|p| p.final_estimate).collect();
        let b: Vec<_> = second.paths().map(|p| p.final_estimate).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_pixel_outside_image() {
        let mut renderer = DemoRenderer::new(small_config());
        let mut trace = TraceSession::new();
        trace.enable();
        assert!(renderer.render_pixel(8, 0, 1, &mut trace).is_err());
        assert!(renderer.render_pixel(-1, 0, 1, &mut trace).is_err());
        assert!(trace.is_empty());

        renderer.render_pixel(0, 0, 0, &mut trace).unwrap();
        assert!(trace.is_empty());
    }

    #[test]
    fn test_render_image_writes_ppm() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("image.ppm");
        let mut renderer = DemoRenderer::new(DemoConfig {
            output_path: output.clone(),
            ..small_config()
        });
        renderer.render_image().unwrap();

        let bytes = std::fs::read(&output).unwrap();
        let header = b"P6\n8 6\n255\n";
        assert!(bytes.starts_with(header));
        assert_eq!(bytes.len(), header.len() + 8 * 6 * 3);
    }

    #[test]
    fn test_render_information() {
        let mut renderer = DemoRenderer::new(small_config());
        renderer.update_sample_count(64);
        renderer.update_sample_count(0);
        assert_eq!(renderer.sample_count(), 64);

        let mut buf = BytesMut::new();
        renderer.send_render_information(&mut buf).unwrap();
        let mut body = &buf[..];
        assert_eq!(read_opcode(&mut body), Opcode::RenderInfoQuery);
        let info = RenderInfo::decode_body(&mut body).unwrap();
        assert_eq!(info.scene_name, "spheres");
        assert_eq!(info.output_filepath, "./pathscope");
        assert_eq!(info.output_file_extension, "ppm");
        assert_eq!(info.sample_count, 64);
    }

    #[test]
    fn test_scene_records() {
        let renderer = DemoRenderer::new(small_config());
        let mut buf = BytesMut::new();
        renderer.send_camera_data(&mut buf).unwrap();
        renderer.send_mesh_data(&mut buf).unwrap();

        let mut body = &buf[..];
        assert_eq!(read_opcode(&mut body), Opcode::Camera);
        let camera = Camera::decode_body(&mut body).unwrap();
        assert_eq!(camera.origin, renderer.camera.origin);

        let mut spheres = 0;
        while !body.is_empty() {
            assert_eq!(read_opcode(&mut body), Opcode::SceneData);
            assert!(matches!(
                SceneObject::decode_body(&mut body).unwrap(),
                SceneObject::Sphere(_)
            ));
            spheres += 1;
        }
        assert_eq!(spheres, renderer.objects.len());
    }
}
