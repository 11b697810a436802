//! Command execution.

use crate::Commands;
use colored::Colorize;
use pathscope_client::{Client, PixelTrace, SceneData, Welcome};
use pathscope_core::{FieldBag, IntersectionRecord, PathRecord};
use pathscope_protocol::{Color4f, Point3f, RenderInfo, SceneObject};
use std::fmt::Write;
use std::time::Duration;

/// Executes a command and returns the formatted output.
pub async fn execute(
    client: &mut Client,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    tracing::debug!("executing {:?}", cmd);
    match cmd {
        Commands::Repl | Commands::Quit => Err("not a one-shot request".into()),

        Commands::Info => {
            let info = client.request_render_info().await?;
            Ok(format_render_info(&info))
        }

        Commands::Samples { count } => {
            client.set_sample_count(count).await?;
            Ok(format!("{} sample count to {}", "Set".green(), count))
        }

        Commands::Render => {
            client.render_image().await?;
            Ok("Image rendered".green().to_string())
        }

        Commands::Scene { idle_ms } => {
            let scene = client
                .request_scene_data(Duration::from_millis(idle_ms))
                .await?;
            tracing::debug!("scene data: {} objects", scene.objects.len());
            Ok(format_scene(&scene))
        }

        Commands::Pixel {
            x,
            y,
            samples,
            json,
        } => {
            let trace = client.render_pixel(x, y, samples).await?;
            tracing::debug!("pixel ({}, {}) returned {} paths", x, y, trace.len());
            if json {
                Ok(trace.to_json()?)
            } else {
                Ok(format_trace(x, y, &trace))
            }
        }

        Commands::Plugins => Ok(format_welcome(client.welcome())),
    }
}

pub fn format_welcome(welcome: &Welcome) -> String {
    let mut output = format!("Render system: {}\n", welcome.render_system.to_string().cyan());
    if welcome.plugins.is_empty() {
        output.push_str(&"No plugins registered".yellow().to_string());
    } else {
        let ids: Vec<String> = welcome
            .plugins
            .iter()
            .map(|id| format!("{:#06x}", id))
            .collect();
        let _ = write!(output, "Plugins: {}", ids.join(", "));
    }
    output
}

pub fn format_render_info(info: &RenderInfo) -> String {
    format!(
        "{}\n  Output: {}.{}\n  Samples: {}",
        info.scene_name.bold(),
        info.output_filepath,
        info.output_file_extension,
        info.sample_count
    )
}

pub fn format_scene(scene: &SceneData) -> String {
    let mut output = String::new();
    match &scene.camera {
        Some(camera) => {
            let _ = writeln!(
                output,
                "{} origin {} dir {} up {} fov {:.1}",
                "Camera".bold(),
                point(camera.origin),
                point(camera.dir),
                point(camera.up),
                camera.fov
            );
        }
        None => output.push_str(&format!("{}\n", "No camera received".yellow())),
    }
    for (i, object) in scene.objects.iter().enumerate() {
        match object {
            SceneObject::Sphere(sphere) => {
                let _ = writeln!(
                    output,
                    "  [{}] sphere center {} radius {:.3} diffuse {}",
                    i,
                    point(sphere.center),
                    sphere.radius,
                    color(sphere.diffuse)
                );
            }
            SceneObject::Mesh(mesh) => {
                let _ = writeln!(
                    output,
                    "  [{}] mesh {} vertices {} triangles diffuse {}",
                    i,
                    mesh.vertices.len(),
                    mesh.triangles.len(),
                    color(mesh.diffuse)
                );
            }
        }
    }
    let _ = write!(output, "{} objects", scene.objects.len());
    output
}

pub fn format_trace(x: i32, y: i32, trace: &PixelTrace) -> String {
    let mut output = format!(
        "{} ({}, {}): {} paths, {} segments\n",
        "Pixel".bold(),
        x,
        y,
        trace.len(),
        trace.segment_count()
    );
    for path in trace.paths() {
        format_path(&mut output, path);
    }
    output.trim_end().to_string()
}

fn format_path(output: &mut String, path: &PathRecord) {
    let estimate = path
        .final_estimate
        .map(color)
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        output,
        "{} {} length {} origin {} estimate {}",
        "sample".cyan(),
        path.sample_idx,
        path.path_length,
        point(path.origin),
        estimate
    );
    for line in format_fields(&path.fields) {
        let _ = writeln!(output, "    {}", line);
    }
    for segment in path.segments.values() {
        format_segment(output, segment);
    }
}

fn format_segment(output: &mut String, segment: &IntersectionRecord) {
    let mut parts = vec![format!("depth {}", segment.depth_idx)];
    if let Some(position) = segment.position {
        parts.push(format!("hit {}", point(position)));
    }
    if let Some(nee) = &segment.next_event {
        let state = if nee.occluded {
            "occluded".red()
        } else {
            "visible".green()
        };
        parts.push(format!("nee {} {}", point(nee.position), state));
    }
    if let Some(envmap) = segment.envmap_position {
        parts.push(format!("envmap {}", point(envmap)));
    }
    if let Some(estimate) = segment.estimate {
        parts.push(format!("estimate {}", color(estimate)));
    }
    let _ = writeln!(output, "  {}", parts.join("  "));
    for line in format_fields(&segment.fields) {
        let _ = writeln!(output, "      {}", line);
    }
}

/// One `name = values` line per key, across every bucket.
pub fn format_fields(bag: &FieldBag) -> Vec<String> {
    fn lines<T>(
        out: &mut Vec<String>,
        bucket: &std::collections::BTreeMap<String, Vec<T>>,
        show: impl Fn(&T) -> String,
    ) {
        for (name, values) in bucket {
            let values: Vec<String> = values.iter().map(&show).collect();
            out.push(format!("{} = {}", name.dimmed(), values.join(", ")));
        }
    }

    let mut out = Vec::new();
    lines(&mut out, &bag.bools, |v| v.to_string());
    lines(&mut out, &bag.floats, |v| format!("{:.4}", v));
    lines(&mut out, &bag.doubles, |v| format!("{:.4}", v));
    lines(&mut out, &bag.ints, |v| v.to_string());
    lines(&mut out, &bag.point2i, |v| format!("({}, {})", v.x, v.y));
    lines(&mut out, &bag.point2f, |v| format!("({:.3}, {:.3})", v.x, v.y));
    lines(&mut out, &bag.point3i, |v| format!("({}, {}, {})", v.x, v.y, v.z));
    lines(&mut out, &bag.point3f, |v| point(*v));
    lines(&mut out, &bag.colors, |v| color(*v));
    lines(&mut out, &bag.strings, |v| format!("{:?}", v));
    out
}

fn point(p: Point3f) -> String {
    format!("({:.3}, {:.3}, {:.3})", p.x, p.y, p.z)
}

fn color(c: Color4f) -> String {
    format!("rgb({:.3}, {:.3}, {:.3})", c.r, c.g, c.b)
}
