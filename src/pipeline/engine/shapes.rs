use std::f64::consts::PI;
use std::fmt;

/// Mask shapes for `shapeCrop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropShape {
    Circle,
    Ellipse,
    Triangle,
    Diamond,
    Star,
    Heart,
    Hexagon,
    Octagon,
}

impl CropShape {
    pub const ALL: [Self; 8] = [
        Self::Circle,
        Self::Ellipse,
        Self::Triangle,
        Self::Diamond,
        Self::Star,
        Self::Heart,
        Self::Hexagon,
        Self::Octagon,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Circle => "circle",
            Self::Ellipse => "ellipse",
            Self::Triangle => "triangle",
            Self::Diamond => "diamond",
            Self::Star => "star",
            Self::Heart => "heart",
            Self::Hexagon => "hexagon",
            Self::Octagon => "octagon",
        }
    }

    /// `-draw` primitive filling the shape inside a `width`x`height` canvas.
    pub(super) fn draw_primitive(self, width: u32, height: u32) -> String {
        let (cx, cy) = (width / 2, height / 2);
        match self {
            Self::Circle => {
                let r = width.min(height) / 2;
                format!("circle {cx},{cy} {cx},{}", cy - r)
            }
            Self::Ellipse => format!("ellipse {cx},{cy} {cx},{cy} 0,360"),
            Self::Triangle => polygon(&regular(width, height, 3, 1.0)),
            Self::Diamond => polygon(&regular(width, height, 4, 1.0)),
            Self::Hexagon => polygon(&regular(width, height, 6, 1.0)),
            Self::Octagon => polygon(&regular(width, height, 8, 1.0)),
            Self::Star => polygon(&star(width, height)),
            Self::Heart => polygon(&heart(width, height)),
        }
    }
}

impl fmt::Display for CropShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn regular(width: u32, height: u32, sides: u32, scale: f64) -> Vec<(f64, f64)> {
    let (rx, ry) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    (0..sides)
        .map(|i| {
            let angle = -PI / 2.0 + f64::from(i) * 2.0 * PI / f64::from(sides);
            (rx + rx * scale * angle.cos(), ry + ry * scale * angle.sin())
        })
        .collect()
}

fn star(width: u32, height: u32) -> Vec<(f64, f64)> {
    let outer = regular(width, height, 5, 1.0);
    let inner: Vec<(f64, f64)> = {
        let (rx, ry) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
        (0..5)
            .map(|i| {
                let angle = -PI / 2.0 + PI / 5.0 + f64::from(i) * 2.0 * PI / 5.0;
                (rx + rx * 0.4 * angle.cos(), ry + ry * 0.4 * angle.sin())
            })
            .collect()
    };
    outer
        .into_iter()
        .zip(inner)
        .flat_map(|(o, i)| [o, i])
        .collect()
}

fn heart(width: u32, height: u32) -> Vec<(f64, f64)> {
    let (w, h) = (f64::from(width), f64::from(height));
    (0..48)
        .map(|i| {
            let t = f64::from(i) * 2.0 * PI / 48.0;
            let x = 16.0 * t.sin().powi(3);
            let y = 13.0 * t.cos() - 5.0 * (2.0 * t).cos() - 2.0 * (3.0 * t).cos() - (4.0 * t).cos();
            // x spans [-16, 16]; y spans roughly [-17, 12]
            (w / 2.0 + x / 16.0 * w / 2.0, (12.0 - y) / 29.0 * h)
        })
        .collect()
}

fn polygon(points: &[(f64, f64)]) -> String {
    let coords: Vec<String> = points
        .iter()
        .map(|(x, y)| format!("{x:.1},{y:.1}"))
        .collect();
    format!("polygon {}", coords.join(" "))
}
