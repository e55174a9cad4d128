use super::palette::{categorical_palette, viridis, MISSING_COLOR};
use super::*;
use crate::common::*;

use matrix_util::common_io::mkdir_parent;

///
/// Scatter plot of the cells in `obsm[basis]` coloured by a per-cell
/// annotation.
///
/// A categorical column gets one colour per category and a legend; a
/// numeric column gets the viridis colour map and a colour bar, with
/// the highest values drawn last. Cells without a value are drawn
/// first in grey.
///
/// * `data` - expression data with the embedding
/// * `basis` - key of the embedding, e.g., `X_umap`
/// * `color_by` - annotation column
/// * `out_file` - `.png` output
/// * `opts` - figure size, resolution and title
///
pub fn plot_embedding(
    data: &ExpressionData,
    basis: &str,
    color_by: &str,
    out_file: &str,
    opts: &FigureOptions,
) -> anyhow::Result<()> {
    let emb = data
        .obsm
        .get(basis)
        .ok_or_else(|| anyhow::anyhow!("embedding `{}` not found", basis))?;
    if emb.ncols() < 2 {
        anyhow::bail!("embedding `{}` has {} dimensions, need 2", basis, emb.ncols());
    }
    let column = data.obs.get(color_by).ok_or_else(|| {
        anyhow::anyhow!(
            "annotation `{}` not found; available: [{}]",
            color_by,
            data.obs.names().join(", ")
        )
    })?;

    let xs: Vec<f32> = emb.column(0).iter().copied().collect();
    let ys: Vec<f32> = emb.column(1).iter().copied().collect();
    let (x_lo, x_hi) = finite_range(xs.iter().copied()).unwrap_or((0.0, 1.0));
    let (y_lo, y_hi) = finite_range(ys.iter().copied()).unwrap_or((0.0, 1.0));
    let x_range = padded(x_lo, x_hi, 0.05);
    let y_range = padded(y_lo, y_hi, 0.05);

    mkdir_parent(out_file)?;
    let root = BitMapBackend::new(out_file, opts.pixels()).into_drawing_area();
    root.fill(&WHITE)?;
    let (main, side) = split_side_panel(&root, 0.2);

    let mut chart = ChartBuilder::on(&main)
        .caption(opts.title.as_ref(), opts.title_font())
        .margin(opts.px(10.0))
        .x_label_area_size(opts.px(24.0))
        .y_label_area_size(opts.px(24.0))
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(0)
        .y_labels(0)
        .x_desc("UMAP1")
        .y_desc("UMAP2")
        .axis_desc_style(opts.font(12.0))
        .draw()?;

    let radius = opts.marker_radius(opts.point_size).max(1);
    let point = |i: usize, color: RGBColor| {
        Circle::new((xs[i] as f64, ys[i] as f64), radius, color.filled())
    };

    match column {
        ObsColumn::Categorical { codes, categories } => {
            let palette = categorical_palette(categories.len());

            let missing: Vec<usize> = (0..codes.len()).filter(|&i| codes[i] < 0).collect();
            chart.draw_series(missing.iter().map(|&i| point(i, MISSING_COLOR)))?;

            for (k, &color) in palette.iter().enumerate() {
                let cells = (0..codes.len()).filter(|&i| codes[i] == k as i32);
                chart.draw_series(cells.map(|i| point(i, color)))?;
            }

            let mut entries: Vec<(String, RGBColor)> = categories
                .iter()
                .zip(palette.iter())
                .map(|(c, &color)| (c.to_string(), color))
                .collect();
            if !missing.is_empty() {
                entries.push(("NA".to_string(), MISSING_COLOR));
            }
            draw_legend(&side, &entries, opts)?;
        }
        ObsColumn::Numeric(values) => {
            let (lo, hi) = finite_range(values.iter().copied()).unwrap_or((0.0, 0.0));
            let denom = if hi > lo { (hi - lo) as f64 } else { 1.0 };

            let mut order: Vec<usize> = (0..values.len()).collect();
            order.sort_by(|&a, &b| {
                let (x, y) = (values[a], values[b]);
                match (x.is_nan(), y.is_nan()) {
                    (true, true) => std::cmp::Ordering::Equal,
                    (true, false) => std::cmp::Ordering::Less,
                    (false, true) => std::cmp::Ordering::Greater,
                    (false, false) => x.total_cmp(&y),
                }
            });

            chart.draw_series(order.iter().map(|&i| {
                let v = values[i];
                let color = if v.is_nan() {
                    MISSING_COLOR
                } else {
                    viridis((v - lo) as f64 / denom)
                };
                point(i, color)
            }))?;

            draw_colorbar(&side, lo, hi, viridis, color_by, opts)?;
        }
    }

    root.present()?;
    info!("Wrote {}", out_file);
    Ok(())
}
