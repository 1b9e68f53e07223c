use std::fmt::Write;

use base64::Engine;
use rand::Rng;

use crate::models::{HandwritingResult, Indicator, IndicatorCategory};

pub const CANVAS_WIDTH: f32 = 400.0;
pub const CANVAS_HEIGHT: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, CANVAS_WIDTH),
            y: y.clamp(0.0, CANVAS_HEIGHT),
        }
    }
}

/// Pointer-drag drawing surface. A stroke counts once it is ended.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    strokes: Vec<Vec<Point>>,
    active: Option<Vec<Point>>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_stroke(&mut self, at: Point) {
        self.end_stroke();
        self.active = Some(vec![at]);
    }

    /// Ignored when no stroke is in progress.
    pub fn extend_stroke(&mut self, to: Point) {
        if let Some(stroke) = self.active.as_mut() {
            stroke.push(to);
        }
    }

    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.active.take() {
            self.strokes.push(stroke);
        }
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.active = None;
    }

    pub fn strokes(&self) -> &[Vec<Point>] {
        &self.strokes
    }

    pub fn has_drawing(&self) -> bool {
        !self.strokes.is_empty()
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CANVAS_WIDTH}" height="{CANVAS_HEIGHT}" viewBox="0 0 {CANVAS_WIDTH} {CANVAS_HEIGHT}"><rect width="100%" height="100%" fill="white"/>"#
        );
        for stroke in &self.strokes {
            let points: Vec<String> = stroke
                .iter()
                .map(|p| format!("{:.1},{:.1}", p.x, p.y))
                .collect();
            let _ = write!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="black" stroke-width="3" stroke-linecap="round"/>"#,
                points.join(" ")
            );
        }
        svg.push_str("</svg>");
        svg
    }

    /// The drawing as a `data:image/svg+xml;base64,...` URL.
    pub fn to_data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.to_svg());
        format!("data:image/svg+xml;base64,{encoded}")
    }
}

/// Stand-in classifier: one observation and at most one indicator.
pub fn analyze<R: Rng + ?Sized>(rng: &mut R, canvas: &Canvas) -> Option<HandwritingResult> {
    if !canvas.has_drawing() {
        return None;
    }

    let roll: f64 = rng.gen();
    let (characteristic, indicator) = if roll < 0.3 {
        (
            "Lines look a bit shaky.",
            Some(Indicator {
                category: IndicatorCategory::FineMotor,
                description: "Making smooth lines might need more practice.".to_string(),
            }),
        )
    } else if roll < 0.7 {
        (
            "Shapes/letters vary in size.",
            Some(Indicator {
                category: IndicatorCategory::VisualMotor,
                description: "Keeping sizes the same can be tricky.".to_string(),
            }),
        )
    } else {
        ("Good effort forming shapes/letters!", None)
    };

    let interpretation = match &indicator {
        Some(indicator) => format!(
            "The drawing shows {characteristic} {} This is common when learning to write!",
            indicator.description
        ),
        None => "Looks like good practice forming shapes and lines!".to_string(),
    };

    Some(HandwritingResult {
        characteristics: vec![characteristic.to_string()],
        indicator,
        interpretation,
        suggested_next_steps: vec![
            "Practice drawing shapes like circles and squares.".to_string(),
            "Use fun materials like play-doh or finger paint.".to_string(),
            "Try tracing letters or shapes.".to_string(),
            "Activities like using scissors or stringing beads can help too!".to_string(),
        ],
        image_data: Some(canvas.to_data_url()),
    })
}
