use crate::diagram::{
    self, BiasTier, CORRELATION_LABEL, CORRELATION_LABEL_ANGLE_DEG, CORRELATION_TICKS, Diagram, MarkerShape,
    RADIAL_GRID, RADIUS_LABEL, RADIUS_LIMIT, REFERENCE_LABEL, REFERENCE_LABEL_ANGLE_DEG, SkippedPoint,
};
use crate::error::{Result, TaylorError};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontTransform;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Output image size in pixels.
pub const CANVAS: (u32, u32) = (1200, 800);

// Pixel position of the diagram origin and pixels per unit radius.
const ORIGIN: (f64, f64) = (260.0, 720.0);
const SCALE: f64 = 330.0;
// Marker sizes are given in points.
const POINTS_TO_PIXELS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Bmp,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Svg => "svg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = TaylorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "bmp" => Ok(ImageFormat::Bmp),
            "svg" => Ok(ImageFormat::Svg),
            other => Err(TaylorError::Unsupported(format!(
                "image format '{}' (expected png, jpg, bmp or svg)",
                other
            ))),
        }
    }
}

fn render_error<E: fmt::Display>(e: E) -> TaylorError {
    TaylorError::Render(e.to_string())
}

/// Render `diagram` to `path`. Returns the points that could not be drawn.
pub fn render_to_file(diagram: &Diagram, path: &Path, format: ImageFormat) -> Result<Vec<SkippedPoint>> {
    match format {
        ImageFormat::Svg => {
            let root = SVGBackend::new(path, CANVAS).into_drawing_area();
            let skipped = draw(&root, diagram)?;
            root.present().map_err(render_error)?;
            Ok(skipped)
        }
        ImageFormat::Png | ImageFormat::Jpg | ImageFormat::Bmp => {
            let root = BitMapBackend::new(path, CANVAS).into_drawing_area();
            let skipped = draw(&root, diagram)?;
            root.present().map_err(render_error)?;
            Ok(skipped)
        }
    }
}

/// Render `diagram` into an RGB buffer of `size` pixels.
pub fn render_to_rgb(diagram: &Diagram, buffer: &mut [u8], size: (u32, u32)) -> Result<Vec<SkippedPoint>> {
    let root = BitMapBackend::with_buffer(buffer, size).into_drawing_area();
    let skipped = draw(&root, diagram)?;
    root.present().map_err(render_error)?;
    Ok(skipped)
}

/// Pixel coordinate of a point at `radius` and clockwise-from-top `theta`.
fn to_pixel(radius: f64, theta: f64) -> (i32, i32) {
    let (x, y) = diagram::polar_to_xy(radius, theta);
    ((ORIGIN.0 + x * SCALE).round() as i32, (ORIGIN.1 - y * SCALE).round() as i32)
}

fn arc(radius: f64) -> Vec<(i32, i32)> {
    const STEPS: usize = 90;
    (0..=STEPS)
        .map(|i| to_pixel(radius, FRAC_PI_2 * i as f64 / STEPS as f64))
        .collect()
}

fn text_style(size: u32, color: &RGBColor, pos: Pos) -> TextStyle<'static> {
    ("sans-serif", size).into_font().color(color).pos(pos)
}

/// Draw the whole diagram on `root`.
pub fn draw<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, diagram: &Diagram) -> Result<Vec<SkippedPoint>> {
    root.fill(&WHITE).map_err(render_error)?;

    draw_frame(root)?;
    draw_labels(root, &diagram.title)?;

    let (markers, skipped) = diagram.markers();
    for marker in &markers {
        let color = RGBColor(marker.color.0, marker.color.1, marker.color.2);
        let center = (
            (ORIGIN.0 + marker.x * SCALE).round() as i32,
            (ORIGIN.1 - marker.y * SCALE).round() as i32,
        );
        let half = draw_marker(root, center, marker.shape, marker.size, &color, false)?;
        root.draw(&Text::new(
            marker.number.to_string(),
            (center.0, center.1 - half - 5),
            text_style(20, &color, Pos::new(HPos::Center, VPos::Bottom)),
        ))
        .map_err(render_error)?;
    }

    draw_case_legend(root, diagram)?;
    draw_bias_legend(root)?;
    draw_variable_legend(root, diagram)?;

    Ok(skipped)
}

fn draw_frame<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>) -> Result<()> {
    let grid = RGBColor(200, 200, 200);
    for &r in RADIAL_GRID.iter().filter(|&&r| r > 0.0) {
        let style = if r == 1.0 { BLACK.stroke_width(1) } else { grid.stroke_width(1) };
        root.draw(&PathElement::new(arc(r), style)).map_err(render_error)?;
        root.draw(&Text::new(
            format!("{:.2}", r),
            (ORIGIN.0 as i32 - 8, to_pixel(r, 0.0).1),
            text_style(14, &BLACK, Pos::new(HPos::Right, VPos::Center)),
        ))
        .map_err(render_error)?;
    }

    // Outer edge and the two axes.
    root.draw(&PathElement::new(arc(RADIUS_LIMIT), BLACK.stroke_width(2)))
        .map_err(render_error)?;
    let origin = to_pixel(0.0, 0.0);
    for theta in [0.0, FRAC_PI_2] {
        root.draw(&PathElement::new(
            vec![origin, to_pixel(RADIUS_LIMIT, theta)],
            BLACK.stroke_width(2),
        ))
        .map_err(render_error)?;
    }

    for &c in CORRELATION_TICKS.iter() {
        let theta = diagram::polar_angle(c);
        root.draw(&PathElement::new(
            vec![to_pixel(RADIUS_LIMIT * 0.97, theta), to_pixel(RADIUS_LIMIT, theta)],
            BLACK.stroke_width(1),
        ))
        .map_err(render_error)?;
        root.draw(&Text::new(
            format!("{}", c),
            to_pixel(RADIUS_LIMIT * 1.04, theta),
            text_style(14, &BLACK, Pos::new(HPos::Center, VPos::Center)),
        ))
        .map_err(render_error)?;
    }
    Ok(())
}

fn draw_labels<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, title: &str) -> Result<()> {
    root.draw(&Text::new(
        CORRELATION_LABEL,
        to_pixel(RADIUS_LIMIT * 1.1, CORRELATION_LABEL_ANGLE_DEG.to_radians()),
        text_style(24, &BLACK, Pos::new(HPos::Center, VPos::Center)),
    ))
    .map_err(render_error)?;

    root.draw(&Text::new(
        REFERENCE_LABEL,
        to_pixel(1.0, REFERENCE_LABEL_ANGLE_DEG.to_radians()),
        text_style(16, &BLACK, Pos::new(HPos::Center, VPos::Top)),
    ))
    .map_err(render_error)?;

    let rotated = ("sans-serif", 18)
        .into_font()
        .transform(FontTransform::Rotate270)
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(
        RADIUS_LABEL,
        (
            ORIGIN.0 as i32 - 70,
            (ORIGIN.1 - RADIUS_LIMIT * SCALE / 2.0).round() as i32,
        ),
        rotated,
    ))
    .map_err(render_error)?;

    root.draw(&Text::new(
        title.to_string(),
        (CANVAS.0 as i32 / 2, 12),
        text_style(22, &BLACK, Pos::new(HPos::Center, VPos::Top)),
    ))
    .map_err(render_error)?;
    Ok(())
}

/// Draw one marker centered at `center`; returns its half height in pixels.
fn draw_marker<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    center: (i32, i32),
    shape: MarkerShape,
    size: u32,
    color: &RGBColor,
    hollow: bool,
) -> Result<i32> {
    let half = ((size as f64 * POINTS_TO_PIXELS) / 2.0).round().max(2.0) as i32;
    let (cx, cy) = center;

    let points = match shape {
        MarkerShape::Circle => {
            root.draw(&Circle::new(center, half as u32, color.filled()))
                .map_err(render_error)?;
            return Ok(half);
        }
        MarkerShape::UpTriangle => vec![(cx, cy - half), (cx - half, cy + half), (cx + half, cy + half)],
        MarkerShape::DownTriangle => vec![(cx, cy + half), (cx - half, cy - half), (cx + half, cy - half)],
    };

    if hollow {
        let mut outline = points.clone();
        outline.push(points[0]);
        root.draw(&PathElement::new(outline, color.stroke_width(1)))
            .map_err(render_error)?;
    } else {
        root.draw(&Polygon::new(points, color.filled())).map_err(render_error)?;
    }
    Ok(half)
}

fn draw_case_legend<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, diagram: &Diagram) -> Result<()> {
    let line_height = 24;
    for (n, case) in diagram.cases.iter().enumerate() {
        let color = RGBColor(case.color.0, case.color.1, case.color.2);
        root.draw(&Text::new(
            case.name.clone(),
            (ORIGIN.0 as i32 + 20, ORIGIN.1 as i32 - 16 - n as i32 * line_height),
            text_style(16, &color, Pos::new(HPos::Left, VPos::Bottom)),
        ))
        .map_err(render_error)?;
    }
    Ok(())
}

fn draw_bias_legend<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>) -> Result<()> {
    let left = 24;
    let top = 20;
    root.draw(&Text::new(
        " - / + Bias",
        (left, top),
        text_style(20, &BLACK, Pos::new(HPos::Left, VPos::Top)),
    ))
    .map_err(render_error)?;

    for (row, tier) in diagram::bias_legend().iter().enumerate() {
        let y = top + 50 + row as i32 * 30;
        draw_bias_tier(root, tier, (left + 14, y))?;
        root.draw(&Text::new(
            tier.label,
            (left + 80, y),
            text_style(15, &BLACK, Pos::new(HPos::Left, VPos::Center)),
        ))
        .map_err(render_error)?;
    }
    Ok(())
}

fn draw_bias_tier<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, tier: &BiasTier, at: (i32, i32)) -> Result<()> {
    if tier.paired {
        draw_marker(root, at, MarkerShape::DownTriangle, tier.size, &BLACK, tier.hollow)?;
        draw_marker(root, (at.0 + 30, at.1), MarkerShape::UpTriangle, tier.size, &BLACK, tier.hollow)?;
    } else {
        draw_marker(root, (at.0 + 15, at.1), MarkerShape::Circle, tier.size, &BLACK, tier.hollow)?;
    }
    Ok(())
}

fn draw_variable_legend<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, diagram: &Diagram) -> Result<()> {
    let x = (CANVAS.0 as f64 * 0.72) as i32;
    for (i, line) in diagram.variable_legend().into_iter().enumerate() {
        root.draw(&Text::new(
            line,
            (x, 60 + i as i32 * 24),
            text_style(16, &BLACK, Pos::new(HPos::Left, VPos::Top)),
        ))
        .map_err(render_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{CaseSeries, case_color};
    use crate::stats::TaylorStats;
    use tempfile::TempDir;

    fn sample() -> Diagram {
        Diagram {
            title: "DJF".to_string(),
            variables: vec!["PSL".to_string(), "SWCF".to_string()],
            cases: vec![CaseSeries {
                name: "c1".to_string(),
                color: case_color(0),
                stats: vec![
                    Some(TaylorStats { correlation: 0.95, ratio: 1.1, bias_percent: 12.0 }),
                    Some(TaylorStats { correlation: f64::NAN, ratio: 1.0, bias_percent: 0.0 }),
                ],
            }],
        }
    }

    #[test]
    fn test_image_format_parsing() {
        assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("jpeg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpg);
        assert_eq!(".svg".parse::<ImageFormat>().unwrap(), ImageFormat::Svg);
        assert!(matches!("pdf".parse::<ImageFormat>(), Err(TaylorError::Unsupported(_))));
    }

    #[test]
    fn test_svg_diagram_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("amwg_taylor_diagram_DJF.svg");
        let skipped = render_to_file(&sample(), &path, ImageFormat::Svg).unwrap();

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].variable, "SWCF");

        let svg = std::fs::read_to_string(&path).unwrap();
        for expected in ["Correlation", "REF", "Standardized Deviations", "1 - PSL", "2 - SWCF", "c1", "10-20%"] {
            assert!(svg.contains(expected), "missing '{}' in SVG output", expected);
        }
    }

    #[test]
    fn test_png_diagram_written() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("amwg_taylor_diagram_DJF.png");
        let skipped = render_to_file(&sample(), &path, ImageFormat::Png).unwrap();
        assert_eq!(skipped.len(), 1);

        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_pixel_mapping() {
        assert_eq!(to_pixel(0.0, 0.0), (260, 720));
        assert_eq!(to_pixel(1.0, FRAC_PI_2), (590, 720));
        assert_eq!(to_pixel(1.0, 0.0), (260, 390));
    }
}
