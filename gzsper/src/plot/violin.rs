use super::palette::categorical_palette;
use super::*;
use crate::common::*;

use matrix_util::common_io::mkdir_parent;
use plotters::style::FontTransform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// half of the widest violin, in category units
const HALF_WIDTH: f64 = 0.4;
/// horizontal spread of the jittered points
const JITTER: f64 = 0.4;
const GRID_POINTS: usize = 100;
/// marker area of the jittered points in pt^2
const JITTER_POINT_SIZE: f32 = 1.0;

/// Gaussian kernel density estimate with Scott's bandwidth,
/// `h = sd * n^(-1/5)`
pub struct GaussianKde {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// `None` for fewer than two samples or zero spread
    pub fn new(samples: &[f64]) -> Option<Self> {
        let nn = samples.len();
        if nn < 2 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / nn as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (nn - 1) as f64;
        let bandwidth = var.sqrt() * (nn as f64).powf(-0.2);
        if !bandwidth.is_finite() || bandwidth <= 0.0 {
            return None;
        }
        Some(Self {
            samples: samples.to_vec(),
            bandwidth,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn density(&self, y: f64) -> f64 {
        let h = self.bandwidth;
        let norm = (self.samples.len() as f64) * h * (2.0 * std::f64::consts::PI).sqrt();
        self.samples
            .iter()
            .map(|&x| (-0.5 * ((y - x) / h).powi(2)).exp())
            .sum::<f64>()
            / norm
    }
}

/// Outline of one violin centred at `x0`: right side bottom to top,
/// then left side top to bottom. The widest point is `HALF_WIDTH`
/// away from the centre and the density is cut at the data range.
fn violin_outline(kde: &GaussianKde, lo: f64, hi: f64, x0: f64) -> Vec<(f64, f64)> {
    let grid: Vec<f64> = (0..GRID_POINTS)
        .map(|i| lo + (hi - lo) * i as f64 / (GRID_POINTS - 1) as f64)
        .collect();
    let dens: Vec<f64> = grid.iter().map(|&y| kde.density(y)).collect();
    let dmax = dens.iter().copied().fold(0.0, f64::max);
    let scale = if dmax > 0.0 { HALF_WIDTH / dmax } else { 0.0 };

    let right = grid.iter().zip(dens.iter()).map(|(&y, &d)| (x0 + d * scale, y));
    let left = grid
        .iter()
        .zip(dens.iter())
        .rev()
        .map(|(&y, &d)| (x0 - d * scale, y));
    right.chain(left).collect()
}

///
/// Violin plot of a numeric annotation per category of `groupby`,
/// with the cells overlaid as jittered points.
///
/// * `data` - expression data
/// * `groupby` - categorical annotation on the x-axis
/// * `key` - numeric annotation on the y-axis
/// * `out_file` - `.png` output
/// * `opts` - figure size, resolution and title
///
pub fn plot_violin(
    data: &ExpressionData,
    groupby: &str,
    key: &str,
    out_file: &str,
    opts: &FigureOptions,
) -> anyhow::Result<()> {
    let (codes, categories) = data.obs.categorical(groupby)?;
    let values = data.obs.numeric(key)?;
    let ncat = categories.len();

    let mut groups: Vec<Vec<f64>> = vec![vec![]; ncat];
    for (&c, &v) in codes.iter().zip(values.iter()) {
        if c >= 0 && v.is_finite() {
            groups[c as usize].push(v as f64);
        }
    }

    let (lo, hi) = finite_range(groups.iter().flatten().map(|&v| v as f32)).unwrap_or((0.0, 1.0));
    let y_range = padded(lo, hi, 0.05);
    let x_range = (-0.5, ncat.max(1) as f64 - 0.5);

    mkdir_parent(out_file)?;
    let root = BitMapBackend::new(out_file, opts.pixels()).into_drawing_area();
    root.fill(&WHITE)?;

    let label_font = opts.font(11.0);
    let (plot_w, _) = root.dim_in_pixel();
    let slot = plot_w as f64 / ncat.max(1) as f64;
    let mut widest = 0;
    for c in categories.iter() {
        let (w, _) = root.estimate_text_size(c, &label_font)?;
        widest = widest.max(w);
    }
    let rotate = widest as f64 > 0.9 * slot;
    let label_area = if rotate {
        widest + opts.px(12.0)
    } else {
        opts.px(30.0)
    };

    let mut chart = ChartBuilder::on(&root)
        .caption(opts.title.as_ref(), opts.title_font())
        .margin(opts.px(10.0))
        .x_label_area_size(label_area)
        .y_label_area_size(opts.px(40.0))
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(0)
        .y_desc(key)
        .label_style(opts.font(10.0))
        .axis_desc_style(opts.font(12.0))
        .draw()?;

    let palette = categorical_palette(ncat);
    let radius = opts.marker_radius(JITTER_POINT_SIZE).max(1);
    let mut rng = StdRng::seed_from_u64(DEFAULT_SEED);

    for (k, vals) in groups.iter().enumerate() {
        if vals.is_empty() {
            continue;
        }
        let x0 = k as f64;
        let color = palette[k];

        match GaussianKde::new(vals) {
            Some(kde) => {
                let g_lo = vals.iter().copied().fold(f64::INFINITY, f64::min);
                let g_hi = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let outline = violin_outline(&kde, g_lo, g_hi, x0);
                chart.draw_series(std::iter::once(Polygon::new(
                    outline.clone(),
                    color.mix(0.8).filled(),
                )))?;
                let mut closed = outline;
                if let Some(&first) = closed.first() {
                    closed.push(first);
                }
                chart.draw_series(std::iter::once(PathElement::new(
                    closed,
                    BLACK.stroke_width(1),
                )))?;
            }
            None => {
                // no spread: a flat line at the value
                let y = vals[0];
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(x0 - HALF_WIDTH, y), (x0 + HALF_WIDTH, y)],
                    color.stroke_width(opts.px(1.0)),
                )))?;
            }
        }

        let jittered: Vec<(f64, f64)> = vals
            .iter()
            .map(|&y| (x0 + rng.random_range(-JITTER..JITTER), y))
            .collect();
        chart.draw_series(
            jittered
                .into_iter()
                .map(|pt| Circle::new(pt, radius, BLACK.filled())),
        )?;
    }

    for (k, c) in categories.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(k as f64, y_range.0));
        let y = py + opts.px(4.0) as i32;
        let style = if rotate {
            label_font
                .clone()
                .transform(FontTransform::Rotate90)
                .pos(Pos::new(HPos::Left, VPos::Center))
        } else {
            label_font.clone().pos(Pos::new(HPos::Center, VPos::Top))
        };
        root.draw(&Text::new(c.to_string(), (px, y), style))?;
    }

    root.present()?;
    info!("Wrote {}", out_file);
    Ok(())
}
