// Proportion chart and statistics block for a feasible model.

use crate::process::AdmixError;
use crate::stats::{DerivedWeightsRow, FitRow};

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;

pub const SOURCE_COLUMN_WIDTH: usize = 40;
pub const STATS_RULE_WIDTH: usize = 60;

pub const CHART_SIZE: (u32, u32) = (1200, 1000);

// matplotlib's default color cycle
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSlice {
    pub label: String,
    pub weight: f64,
    /// Share of the plotted total, e.g. `"70.0%"`.
    pub percent_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub slices: Vec<ChartSlice>,
    pub stats_block: String,
}

/// Builds the chart content. Only strictly positive weights become slices;
/// the statistics block still lists every row.
pub fn compose(target: &str, rows: &[DerivedWeightsRow], fit: &FitRow) -> ChartSpec {
    let plotted: Vec<&DerivedWeightsRow> = rows.iter().filter(|r| r.weight > 0.0).collect();
    let total: f64 = plotted.iter().map(|r| r.weight).sum();

    let slices = plotted
        .iter()
        .map(|r| ChartSlice {
            label: r.left.clone(),
            weight: r.weight,
            percent_label: format!("{:.1}%", r.weight / total * 100.0),
        })
        .collect();

    ChartSpec {
        title: format!("Target: {}", target),
        slices,
        stats_block: format_stats_block(rows, fit),
    }
}

pub fn format_stats_block(rows: &[DerivedWeightsRow], fit: &FitRow) -> String {
    let rule = "-".repeat(STATS_RULE_WIDTH);
    let mut text = String::new();
    text.push_str(&format!("P-Value: {:.4}\n", fit.p));
    text.push_str(&format!("χ²: {:.4}\n", fit.chisq));
    text.push_str(&rule);
    text.push('\n');
    text.push_str(&format!(
        "{:<width$} | {:>7} | {:>7}\n",
        "Source",
        "SE (%)",
        "Z-score",
        width = SOURCE_COLUMN_WIDTH
    ));
    text.push_str(&rule);
    text.push('\n');
    for row in rows {
        text.push_str(&format!(
            "{:<width$} | {:>6.2}% | {:>7.2}\n",
            row.left,
            row.se * 100.0,
            row.zscore,
            width = SOURCE_COLUMN_WIDTH
        ));
    }
    text
}

// Point on the circle at `degrees`, counter-clockwise from 3 o'clock (y grows downward).
fn polar(center: (i32, i32), radius: f64, degrees: f64) -> (i32, i32) {
    let rad = degrees.to_radians();
    (
        center.0 + (radius * rad.cos()).round() as i32,
        center.1 - (radius * rad.sin()).round() as i32,
    )
}

// Closed wedge outline, one vertex per degree of arc at most.
fn wedge_points(center: (i32, i32), radius: f64, start: f64, sweep: f64) -> Vec<(i32, i32)> {
    let steps = sweep.ceil().max(1.0) as usize;
    let mut points = Vec::with_capacity(steps + 2);
    points.push(center);
    for step in 0..=steps {
        points.push(polar(center, radius, start + sweep * step as f64 / steps as f64));
    }
    points
}

/// Draws the pie, its labels, the title and the statistics box onto `root`.
/// Slices start at 12 o'clock and run counter-clockwise.
pub fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    spec: &ChartSpec,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (width, height) = root.dim_in_pixel();
    let center = (width as i32 / 2, 360);
    let radius = 250.0;

    root.fill(&WHITE)?;
    root.draw(&Text::new(
        spec.title.clone(),
        (center.0, 50),
        ("sans-serif", 24)
            .into_font()
            .style(FontStyle::Bold)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center)),
    ))?;

    let total: f64 = spec.slices.iter().map(|s| s.weight).sum();
    let mut angle = 90.0;
    for (i, slice) in spec.slices.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let sweep = if total > 0.0 { slice.weight / total * 360.0 } else { 0.0 };

        if sweep >= 359.999 {
            root.draw(&Circle::new(center, radius as i32, color.filled()))?;
        } else {
            root.draw(&Polygon::new(wedge_points(center, radius, angle, sweep), color.filled()))?;
        }

        let mid = angle + sweep / 2.0;
        let h_pos = if mid.to_radians().cos() >= 0.0 { HPos::Left } else { HPos::Right };
        root.draw(&Text::new(
            slice.label.clone(),
            polar(center, radius * 1.1, mid),
            ("sans-serif", 16).into_font().color(&BLACK).pos(Pos::new(h_pos, VPos::Center)),
        ))?;
        root.draw(&Text::new(
            slice.percent_label.clone(),
            polar(center, radius * 0.85, mid),
            ("sans-serif", 12)
                .into_font()
                .style(FontStyle::Bold)
                .color(&WHITE)
                .pos(Pos::new(HPos::Center, VPos::Center)),
        ))?;

        angle += sweep;
    }

    let line_height = 18;
    let lines: Vec<&str> = spec.stats_block.lines().collect();
    let box_width = 680;
    let box_height = lines.len() as i32 * line_height + 24;
    let box_x = (width as i32 - box_width) / 2;
    let box_y = height as i32 - box_height - 40;

    root.draw(&Rectangle::new(
        [(box_x, box_y), (box_x + box_width, box_y + box_height)],
        RGBColor(245, 245, 245).filled(),
    ))?;
    root.draw(&Rectangle::new(
        [(box_x, box_y), (box_x + box_width, box_y + box_height)],
        BLACK.stroke_width(1),
    ))?;
    for (i, line) in lines.iter().enumerate() {
        // Non-breaking spaces keep the fixed-width columns from collapsing in SVG
        root.draw(&Text::new(
            line.replace(' ', "\u{a0}"),
            (box_x + 12, box_y + 12 + i as i32 * line_height),
            ("monospace", 14).into_font().color(&BLACK).pos(Pos::new(HPos::Left, VPos::Top)),
        ))?;
    }

    root.present()
}

/// Renders the chart as a standalone SVG document.
pub fn render_svg(spec: &ChartSpec) -> Result<String, AdmixError> {
    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, CHART_SIZE).into_drawing_area();
        draw_chart(&root, spec).map_err(|e| AdmixError::Chart(e.to_string()))?;
    }
    Ok(buffer)
}

pub fn write_svg(path: &Path, spec: &ChartSpec) -> Result<(), AdmixError> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    draw_chart(&root, spec).map_err(|e| AdmixError::Chart(e.to_string()))
}
