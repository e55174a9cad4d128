pub mod dotplot;
pub mod embedding;
pub mod palette;
pub mod violin;

pub use dotplot::plot_dotplot;
pub use embedding::plot_embedding;
pub use violin::plot_violin;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

pub const DEFAULT_DPI: u32 = 300;
/// marker area in pt^2
pub const DEFAULT_POINT_SIZE: f32 = 20.0;

const POINTS_PER_INCH: f32 = 72.0;
const FONT_FAMILY: &str = "sans-serif";

/// Figure geometry and labels shared by the renderers
#[derive(Clone, Debug)]
pub struct FigureOptions {
    pub title: Box<str>,
    /// width and height in inches
    pub size: (f32, f32),
    pub dpi: u32,
    /// marker area in pt^2
    pub point_size: f32,
}

impl FigureOptions {
    pub fn new(title: &str, size: (f32, f32), dpi: u32) -> Self {
        Self {
            title: title.into(),
            size,
            dpi,
            point_size: DEFAULT_POINT_SIZE,
        }
    }

    pub fn pixels(&self) -> (u32, u32) {
        let w = (self.size.0 * self.dpi as f32).round().max(1.0) as u32;
        let h = (self.size.1 * self.dpi as f32).round().max(1.0) as u32;
        (w, h)
    }

    /// length in points to pixels
    pub fn px(&self, pt: f32) -> u32 {
        (pt * self.dpi as f32 / POINTS_PER_INCH).round().max(1.0) as u32
    }

    /// radius in pixels of a marker with `area` pt^2
    pub fn marker_radius(&self, area: f32) -> u32 {
        (area.max(0.0).sqrt() / 2.0 * self.dpi as f32 / POINTS_PER_INCH).round() as u32
    }

    pub fn font(&self, pt: f32) -> TextStyle<'static> {
        (FONT_FAMILY, self.px(pt) as f64).into_font().color(&BLACK)
    }

    pub fn title_font(&self) -> TextStyle<'static> {
        (FONT_FAMILY, self.px(16.0) as f64).into_font().color(&BLACK)
    }
}

/// Split off a panel on the right for a legend or a colour bar
pub(crate) fn split_side_panel<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    side_fraction: f32,
) -> (DrawingArea<DB, Shift>, DrawingArea<DB, Shift>) {
    let (w, _) = root.dim_in_pixel();
    let main_w = (w as f32 * (1.0 - side_fraction)).round() as u32;
    root.split_horizontally(main_w)
}

/// (min, max) over finite values; `None` if there is none
pub(crate) fn finite_range<I: IntoIterator<Item = f32>>(values: I) -> Option<(f32, f32)> {
    values
        .into_iter()
        .filter(|x| x.is_finite())
        .fold(None, |acc, x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })
}

/// Widen a range by `frac` on both sides, or by one unit if empty
pub(crate) fn padded(lo: f32, hi: f32, frac: f32) -> (f64, f64) {
    let (lo, hi) = (lo as f64, hi as f64);
    let pad = if hi > lo { (hi - lo) * frac as f64 } else { 1.0 };
    (lo - pad, hi + pad)
}

/// Legend with one filled circle and label per entry, top to bottom,
/// wrapping into more columns when the panel is full
pub(crate) fn draw_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    entries: &[(String, RGBColor)],
    opts: &FigureOptions,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    let (w, h) = area.dim_in_pixel();
    let font = opts.font(10.0);
    let line = opts.px(14.0) as i32;
    let radius = opts.px(4.0) as i32;
    let top = opts.px(30.0) as i32;
    let left = opts.px(6.0) as i32;

    let per_column = (((h as i32 - top) / line).max(1)) as usize;
    let ncol = entries.len().div_ceil(per_column).max(1);
    let column_width = (w as i32 - left) / ncol as i32;

    for (i, (label, color)) in entries.iter().enumerate() {
        let col = (i / per_column) as i32;
        let row = (i % per_column) as i32;
        let x = left + col * column_width + radius;
        let y = top + row * line;
        area.draw(&Circle::new((x, y), radius, color.filled()))?;
        area.draw(&Text::new(
            label.clone(),
            (x + 2 * radius, y),
            font.clone().pos(Pos::new(HPos::Left, VPos::Center)),
        ))?;
    }
    Ok(())
}

/// Vertical colour bar from `lo` (bottom) to `hi` (top) with three
/// tick labels
pub(crate) fn draw_colorbar<DB, F>(
    area: &DrawingArea<DB, Shift>,
    lo: f32,
    hi: f32,
    colormap: F,
    label: &str,
    opts: &FigureOptions,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
    F: Fn(f64) -> RGBColor,
{
    let (_, h) = area.dim_in_pixel();
    let font = opts.font(10.0);
    let left = opts.px(8.0) as i32;
    let bar_w = opts.px(12.0) as i32;
    let top = opts.px(40.0) as i32;
    let bottom = (h as i32 - opts.px(40.0) as i32).max(top + 2);
    let nsteps = (bottom - top).max(1);

    for s in 0..nsteps {
        let t = 1.0 - s as f64 / (nsteps - 1).max(1) as f64;
        let y = top + s;
        area.draw(&Rectangle::new(
            [(left, y), (left + bar_w, y + 1)],
            colormap(t).filled(),
        ))?;
    }
    area.draw(&Rectangle::new([(left, top), (left + bar_w, bottom)], BLACK.stroke_width(1)))?;

    let mid = (lo + hi) / 2.0;
    for (v, y) in [(hi, top), (mid, (top + bottom) / 2), (lo, bottom)] {
        area.draw(&Text::new(
            format!("{:.2}", v),
            (left + bar_w + opts.px(3.0) as i32, y),
            font.clone().pos(Pos::new(HPos::Left, VPos::Center)),
        ))?;
    }

    area.draw(&Text::new(
        label.to_string(),
        (left, top - opts.px(12.0) as i32),
        font.pos(Pos::new(HPos::Left, VPos::Center)),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_follows_dpi() {
        let opts = FigureOptions::new("t", (12.0, 10.0), 300);
        assert_eq!(opts.pixels(), (3600, 3000));
        assert_eq!(opts.px(72.0), 300);
        // 20 pt^2 marker: diameter sqrt(20) pt
        assert_eq!(opts.marker_radius(20.0), 9);
    }

    #[test]
    fn ranges_skip_non_finite_values() {
        assert_eq!(finite_range([f32::NAN, 2.0, -1.0]), Some((-1.0, 2.0)));
        assert_eq!(finite_range([f32::NAN]), None);
        assert_eq!(padded(1.0, 1.0, 0.05), (0.0, 2.0));
    }
}
