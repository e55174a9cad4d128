use super::palette::reds;
use super::*;
use crate::common::*;

use matrix_util::common_io::mkdir_parent;
use matrix_util::ndarray_stat::RunningStatistics;
use plotters::style::FontTransform;

pub const DEFAULT_DOT_MIN: f32 = 0.1;
pub const DEFAULT_DOT_MAX: f32 = 1.0;

/// marker area in pt^2 of a dot for a full fraction
const LARGEST_DOT: f32 = 200.0;
const SIZE_EXPONENT: f32 = 1.5;

/// Per-category summary of a set of genes
pub struct GroupedExpression {
    /// fraction of cells with expression > 0 (categories x genes)
    pub fraction: Vec<Vec<f32>>,
    /// mean expression (categories x genes)
    pub mean: Vec<Vec<f32>>,
}

impl GroupedExpression {
    ///
    /// Fraction of expressing cells and mean expression of each gene
    /// within each category; cells without a category are skipped.
    ///
    /// * `data` - expression data
    /// * `groupby` - categorical annotation
    /// * `genes` - gene names, all present in `data`
    ///
    pub fn from_data(
        data: &ExpressionData,
        groupby: &str,
        genes: &[Box<str>],
    ) -> anyhow::Result<Self> {
        let (codes, categories) = data.obs.categorical(groupby)?;
        let gene_index = data.gene_index();
        let cols = genes
            .iter()
            .map(|g| {
                gene_index
                    .get(g.as_ref())
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("gene {} not found", g))
            })
            .collect::<anyhow::Result<Vec<usize>>>()?;

        let xx = data.x.select_columns_dense(&cols);
        let ncat = categories.len();
        let ngene = cols.len();

        let mut stats = vec![RunningStatistics::new(ngene); ncat];
        for (row, &c) in xx.outer_iter().zip(codes.iter()) {
            if c >= 0 {
                stats[c as usize].add_row(&row);
            }
        }

        let to_f32 =
            |x: ndarray::Array1<f64>| -> Vec<f32> { x.iter().map(|&v| v as f32).collect() };

        Ok(Self {
            fraction: stats.iter().map(|s| to_f32(s.fraction_positives())).collect(),
            mean: stats.iter().map(|s| to_f32(s.mean())).collect(),
        })
    }

    /// Mean expression of each gene rescaled to `[0, 1]` across the
    /// categories; a gene with the same mean everywhere gets 0
    pub fn standardized_mean(&self) -> Vec<Vec<f32>> {
        let ncat = self.mean.len();
        let ngene = self.mean.first().map(|x| x.len()).unwrap_or(0);
        let mut ret = vec![vec![0_f32; ngene]; ncat];
        for g in 0..ngene {
            let col = (0..ncat).map(|k| self.mean[k][g]);
            if let Some((lo, hi)) = finite_range(col) {
                if hi > lo {
                    for k in 0..ncat {
                        ret[k][g] = (self.mean[k][g] - lo) / (hi - lo);
                    }
                }
            }
        }
        ret
    }
}

/// Marker area in pt^2 for a fraction of expressing cells
pub fn dot_area(fraction: f32, dot_min: f32, dot_max: f32) -> f32 {
    let f = fraction.clamp(dot_min, dot_max);
    let t = if dot_max > dot_min {
        (f - dot_min) / (dot_max - dot_min)
    } else {
        1.0
    };
    t.powf(SIZE_EXPONENT) * LARGEST_DOT
}

///
/// Dot plot of genes (x-axis) by categories (y-axis). Dot size shows
/// the fraction of cells with expression > 0, clipped to
/// `[0.1, 1]`; dot colour shows the mean expression rescaled per gene
/// to `[0, 1]`.
///
/// * `data` - expression data
/// * `genes` - genes to show, in order
/// * `groupby` - categorical annotation
/// * `out_file` - `.png` output
/// * `opts` - figure size, resolution and title
///
pub fn plot_dotplot(
    data: &ExpressionData,
    genes: &[Box<str>],
    groupby: &str,
    out_file: &str,
    opts: &FigureOptions,
) -> anyhow::Result<()> {
    if genes.is_empty() {
        anyhow::bail!("no genes for the dot plot");
    }

    let (_, categories) = data.obs.categorical(groupby)?;
    let stat = GroupedExpression::from_data(data, groupby, genes)?;
    let colour = stat.standardized_mean();

    let ncat = categories.len();
    let ngene = genes.len();

    mkdir_parent(out_file)?;
    let root = BitMapBackend::new(out_file, opts.pixels()).into_drawing_area();
    root.fill(&WHITE)?;
    let (main, side) = split_side_panel(&root, 0.15);

    let label_font = opts.font(11.0);
    let mut gene_label = 0;
    for g in genes.iter() {
        gene_label = gene_label.max(main.estimate_text_size(g, &label_font)?.0);
    }
    let mut cat_label = 0;
    for c in categories.iter() {
        cat_label = cat_label.max(main.estimate_text_size(c, &label_font)?.0);
    }

    let mut chart = ChartBuilder::on(&main)
        .caption(opts.title.as_ref(), opts.title_font())
        .margin(opts.px(10.0))
        .x_label_area_size(gene_label + opts.px(12.0))
        .y_label_area_size(cat_label + opts.px(12.0))
        .build_cartesian_2d(-0.5..(ngene as f64 - 0.5), -0.5..(ncat.max(1) as f64 - 0.5))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(0)
        .y_labels(0)
        .draw()?;

    for k in 0..ncat {
        // first category at the top
        let y = (ncat - 1 - k) as f64;
        chart.draw_series((0..ngene).map(|g| {
            let area = dot_area(stat.fraction[k][g], DEFAULT_DOT_MIN, DEFAULT_DOT_MAX);
            let radius = opts.marker_radius(area);
            Circle::new((g as f64, y), radius, reds(colour[k][g] as f64).filled())
        }))?;
        chart.draw_series((0..ngene).filter_map(|g| {
            let area = dot_area(stat.fraction[k][g], DEFAULT_DOT_MIN, DEFAULT_DOT_MAX);
            let radius = opts.marker_radius(area);
            (radius > 0).then(|| Circle::new((g as f64, y), radius, BLACK.stroke_width(1)))
        }))?;
    }

    let gap = opts.px(4.0) as i32;
    for (g, name) in genes.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(g as f64, -0.5));
        let style = label_font
            .clone()
            .transform(FontTransform::Rotate90)
            .pos(Pos::new(HPos::Left, VPos::Center));
        root.draw(&Text::new(name.to_string(), (px, py + gap), style))?;
    }
    for (k, name) in categories.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(-0.5, (ncat - 1 - k) as f64));
        let style = label_font.clone().pos(Pos::new(HPos::Right, VPos::Center));
        root.draw(&Text::new(name.to_string(), (px - gap, py), style))?;
    }

    let (side_top, side_bottom) = side.split_vertically(side.dim_in_pixel().1 / 2);
    draw_size_legend(&side_top, opts)?;
    draw_colorbar(&side_bottom, 0.0, 1.0, reds, "Mean expression in group", opts)?;

    root.present()?;
    info!("Wrote {}", out_file);
    Ok(())
}

fn draw_size_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    opts: &FigureOptions,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    let font = opts.font(10.0);
    let left = opts.px(12.0) as i32;
    let top = opts.px(40.0) as i32;
    let line = opts.px(22.0) as i32;

    area.draw(&Text::new(
        "Fraction of cells in group (%)".to_string(),
        (opts.px(6.0) as i32, top - opts.px(16.0) as i32),
        font.clone().pos(Pos::new(HPos::Left, VPos::Center)),
    ))?;

    for (i, frac) in [0.2_f32, 0.4, 0.6, 0.8, 1.0].iter().enumerate() {
        let y = top + i as i32 * line;
        let radius = opts.marker_radius(dot_area(*frac, DEFAULT_DOT_MIN, DEFAULT_DOT_MAX));
        area.draw(&Circle::new((left, y), radius, RGBColor(128, 128, 128).filled()))?;
        area.draw(&Text::new(
            format!("{}", (frac * 100.0).round()),
            (left + opts.px(14.0) as i32, y),
            font.clone().pos(Pos::new(HPos::Left, VPos::Center)),
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn dot_sizes_are_clipped() {
        assert_eq!(dot_area(0.0, 0.1, 1.0), 0.0);
        assert_eq!(dot_area(0.05, 0.1, 1.0), 0.0);
        assert_abs_diff_eq!(dot_area(1.0, 0.1, 1.0), LARGEST_DOT);
        assert_abs_diff_eq!(dot_area(2.0, 0.1, 1.0), LARGEST_DOT);
        assert!(dot_area(0.5, 0.1, 1.0) < dot_area(0.6, 0.1, 1.0));
    }

    #[test]
    fn grouped_fraction_and_mean() -> anyhow::Result<()> {
        let x = array![[0.0, 1.0], [2.0, 3.0], [4.0, 0.0], [1.0, 1.0]];
        let mut obs = CellAnnotations::new(4);
        obs.insert(
            "cell_type",
            ObsColumn::Categorical {
                codes: vec![0, 0, 1, MISSING_CODE],
                categories: vec!["a".into(), "b".into()],
            },
        )?;
        let data = ExpressionData::new(
            ExprMatrix::Dense(x),
            (0..4).map(|i| format!("c{}", i).into()).collect(),
            vec!["g0".into(), "g1".into()],
            obs,
        )?;

        let genes: Vec<Box<str>> = vec!["g1".into(), "g0".into()];
        let stat = GroupedExpression::from_data(&data, "cell_type", &genes)?;
        assert_eq!(stat.fraction, vec![vec![1.0, 0.5], vec![0.0, 1.0]]);
        assert_eq!(stat.mean, vec![vec![2.0, 1.0], vec![0.0, 4.0]]);

        let z = stat.standardized_mean();
        assert_eq!(z, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn unknown_gene_is_an_error() -> anyhow::Result<()> {
        let mut obs = CellAnnotations::new(1);
        obs.insert("cell_type", ObsColumn::categorical_from_labels(&["a".into()]))?;
        let data = ExpressionData::new(
            ExprMatrix::Dense(array![[1.0]]),
            vec!["c0".into()],
            vec!["g0".into()],
            obs,
        )?;
        assert!(GroupedExpression::from_data(&data, "cell_type", &["x".into()]).is_err());
        Ok(())
    }
}
