use crate::geometry::Point;
use crate::model::CameraId;
use std::fmt::Write as _;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::format_description;

const MARGIN: f64 = 20.0;

#[derive(Debug, Clone, Copy)]
pub struct OverlayFrame<'a> {
    pub camera_id: CameraId,
    pub generated_at: OffsetDateTime,
    pub accumulated: &'a [Point],
    pub added: &'a [Point],
    /// `None` when no boundary could be computed this cycle.
    pub boundary: Option<&'a [Point]>,
    pub area: f64,
}

pub trait OverlaySink: Send + Sync {
    fn render(&self, frame: &OverlayFrame<'_>) -> std::io::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct SvgOverlayWriter {
    dir: PathBuf,
}

impl SvgOverlayWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl OverlaySink for SvgOverlayWriter {
    fn render(&self, frame: &OverlayFrame<'_>) -> std::io::Result<PathBuf> {
        let stamp = frame
            .generated_at
            .format(format_description!(
                "[year repr:last_two][month][day][hour][minute][second]"
            ))
            .map_err(std::io::Error::other)?;
        let dir = self.dir.join(format!("camera{}", frame.camera_id));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("roi_{stamp}.svg"));
        std::fs::write(&path, render_svg(frame))?;
        Ok(path)
    }
}

pub fn render_svg(frame: &OverlayFrame<'_>) -> String {
    let all = frame
        .accumulated
        .iter()
        .chain(frame.added)
        .chain(frame.boundary.unwrap_or(&[]));
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0.0f64, 0.0f64, 1.0f64, 1.0f64);
    for point in all {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    let width = max_x - min_x + 2.0 * MARGIN;
    let height = max_y - min_y + 2.0 * MARGIN;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{} {} {width} {height}">"#,
        min_x - MARGIN,
        min_y - MARGIN,
    );
    let _ = writeln!(svg, "<title>camera {}</title>", frame.camera_id);

    match frame.boundary {
        Some(boundary) if boundary.len() >= 3 => {
            let vertices: Vec<String> = boundary
                .iter()
                .map(|point| format!("{:.1},{:.1}", point.x, point.y))
                .collect();
            let _ = writeln!(
                svg,
                r#"<polygon points="{}" fill="lime" fill-opacity="0.2" stroke="green"/>"#,
                vertices.join(" ")
            );
            let _ = writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" fill="green">area {:.0}</text>"#,
                min_x,
                min_y - MARGIN / 2.0,
                frame.area
            );
        }
        _ => {
            let _ = writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" fill="red">calculation failed</text>"#,
                min_x,
                min_y - MARGIN / 2.0
            );
        }
    }

    for point in frame.accumulated {
        let _ = writeln!(
            svg,
            r#"<circle cx="{:.1}" cy="{:.1}" r="2" fill="steelblue"/>"#,
            point.x, point.y
        );
    }
    for point in frame.added {
        let _ = writeln!(
            svg,
            r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="orange"/>"#,
            point.x, point.y
        );
    }
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::macros::datetime;

    fn frame<'a>(
        accumulated: &'a [Point],
        added: &'a [Point],
        boundary: Option<&'a [Point]>,
    ) -> OverlayFrame<'a> {
        OverlayFrame {
            camera_id: 3,
            generated_at: datetime!(2025-06-07 8:09:10 UTC),
            accumulated,
            added,
            boundary,
            area: 100.0,
        }
    }

    #[test]
    fn boundary_is_drawn_as_polygon() {
        let ring = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ];
        let svg = render_svg(&frame(&ring, &[], Some(&ring[..])));
        assert!(svg.contains("<polygon points=\"0.0,0.0 10.0,0.0 10.0,10.0\""));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(!svg.contains("calculation failed"));
    }

    #[test]
    fn missing_boundary_is_marked() {
        let points = [Point::new(1.0, 1.0)];
        let added = [Point::new(2.0, 2.0)];
        let svg = render_svg(&frame(&points, &added, None));
        assert!(svg.contains("calculation failed"));
        assert!(svg.contains("fill=\"orange\""));
    }

    #[test]
    fn writer_names_file_by_camera_and_time() -> Result<(), Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let dir = std::env::temp_dir().join(format!("crowd-density-overlay-{unique}"));
        let writer = SvgOverlayWriter::new(&dir);

        let path = writer.render(&frame(&[], &[], None))?;
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(path, dir.join("camera3").join("roi_250607080910.svg"));
        Ok(())
    }
}
