use crate::common::*;

use fnv::FnvHashSet;

pub const DEFAULT_TOP_GENES: usize = 20;

/// Genes to draw and genes that had to be left out
#[derive(Clone, Debug, Default)]
pub struct TopGenes {
    pub selected: Vec<Box<str>>,
    pub missing: Vec<Box<str>>,
}

/// Names of the `ntop` genes with the highest mean expression over
/// all cells, in increasing order of the mean. Ties keep the column
/// order.
pub fn highest_mean_genes(data: &ExpressionData, ntop: usize) -> Vec<Box<str>> {
    let means = data.x.column_statistics(|x| x).mean();

    let mut order: Vec<usize> = (0..means.len()).collect();
    order.sort_by(|&a, &b| means[a].total_cmp(&means[b]));

    let skip = order.len().saturating_sub(ntop);
    order[skip..]
        .iter()
        .map(|&j| data.var_names[j].clone())
        .collect()
}

/// Keep the candidate genes that are still columns of `data`; the rest
/// are logged and reported as missing
pub fn select_present_genes(data: &ExpressionData, candidates: &[Box<str>]) -> TopGenes {
    let present: FnvHashSet<&str> = data.var_names.iter().map(|x| x.as_ref()).collect();

    let (selected, missing): (Vec<Box<str>>, Vec<Box<str>>) = candidates
        .iter()
        .cloned()
        .partition(|g| present.contains(g.as_ref()));

    if !missing.is_empty() {
        info!(
            "These genes are not found in the dataset and will be ignored: {}",
            missing.join(", ")
        );
    }

    TopGenes { selected, missing }
}

/// Highest-mean genes that can go into the dot plot
pub fn top_genes(data: &ExpressionData, ntop: usize) -> TopGenes {
    let candidates = highest_mean_genes(data, ntop);
    select_present_genes(data, &candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dataset(x: Array2<f32>) -> ExpressionData {
        let nn = x.nrows();
        let mm = x.ncols();
        ExpressionData::new(
            ExprMatrix::Dense(x),
            (0..nn).map(|i| format!("c{}", i).into()).collect(),
            (0..mm).map(|j| format!("g{:02}", j).into()).collect(),
            CellAnnotations::new(nn),
        )
        .unwrap()
    }

    #[test]
    fn twenty_highest_of_twenty_five() {
        // mean of column j is j, except two ties at the cut
        let mut x = Array2::<f32>::zeros((2, 25));
        for j in 0..25 {
            x[[0, j]] = j as f32;
            x[[1, j]] = j as f32;
        }
        x[[0, 5]] = 4.0;
        x[[1, 5]] = 4.0;

        let data = dataset(x);
        let top = highest_mean_genes(&data, 20);
        assert_eq!(top.len(), 20);

        // g04 and g05 tie at 4; the stable sort puts g04 first and the
        // tail takes g05
        let expected: Vec<Box<str>> = (5..25).map(|j| format!("g{:02}", j).into()).collect();
        assert_eq!(top, expected);
    }

    #[test]
    fn fewer_genes_than_requested() {
        let data = dataset(Array2::from_shape_fn((3, 4), |(i, j)| (i + j) as f32));
        let top = top_genes(&data, 20);
        assert_eq!(top.selected.len(), 4);
        assert!(top.missing.is_empty());
        assert_eq!(top.selected.last().map(|x| x.as_ref()), Some("g03"));
    }

    #[test]
    fn absent_genes_are_reported() -> anyhow::Result<()> {
        let mut data = dataset(Array2::from_shape_fn((3, 6), |(_, j)| j as f32));
        let candidates = highest_mean_genes(&data, 3);
        assert_eq!(candidates, vec![Box::from("g03"), "g04".into(), "g05".into()]);

        data.subset_genes(&[0, 1, 2, 3, 5])?;
        let top = select_present_genes(&data, &candidates);
        assert_eq!(top.selected, vec![Box::from("g03"), "g05".into()]);
        assert_eq!(top.missing, vec![Box::from("g04")]);
        Ok(())
    }
}
