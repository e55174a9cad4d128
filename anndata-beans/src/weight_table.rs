use fnv::FnvHashMap;
use log::{info, warn};
use matrix_util::common_io::{read_lines_of_words_delim, write_lines};

pub const DEFAULT_GENE_COLUMN: &str = "GENE";
pub const DEFAULT_WEIGHT_COLUMN: &str = "MI";

/// Gene-level weights, one per unique gene identifier
#[derive(Clone, Debug, Default)]
pub struct GeneWeights {
    genes: Vec<Box<str>>,
    weights: Vec<f64>,
    index: FnvHashMap<Box<str>, usize>,
}

impl GeneWeights {
    /// Build from (gene, weight) pairs. A gene seen again replaces the
    /// earlier weight but keeps its first position. Returns the table
    /// and the number of replaced rows.
    pub fn from_pairs<I>(pairs: I) -> (Self, usize)
    where
        I: IntoIterator<Item = (Box<str>, f64)>,
    {
        let mut ret = GeneWeights::default();
        let mut ndup = 0;
        for (gene, weight) in pairs {
            if let Some(&k) = ret.index.get(&gene) {
                ret.weights[k] = weight;
                ndup += 1;
            } else {
                ret.index.insert(gene.clone(), ret.genes.len());
                ret.genes.push(gene);
                ret.weights.push(weight);
            }
        }
        (ret, ndup)
    }

    /// Read a delimited table (gzip by extension) with a header line
    ///
    /// * `file` - table file
    /// * `gene_column` - header of the gene identifier column
    /// * `weight_column` - header of the weight column
    pub fn from_tsv(file: &str, gene_column: &str, weight_column: &str) -> anyhow::Result<Self> {
        let table = read_lines_of_words_delim(file, "\t", 0)?;

        let find = |name: &str| {
            table
                .header
                .iter()
                .position(|x| x.trim() == name)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "column `{}` not found in {}; header: [{}]",
                        name,
                        file,
                        table.header.join(", ")
                    )
                })
        };

        let gene_idx = find(gene_column)?;
        let weight_idx = find(weight_column)?;

        let mut pairs = Vec::with_capacity(table.lines.len());
        for (words, &line) in table.lines.iter().zip(table.line_numbers.iter()) {
            let gene = words.get(gene_idx).map(|x| x.trim()).unwrap_or("");
            let value = words.get(weight_idx).map(|x| x.trim()).unwrap_or("");
            if gene.is_empty() {
                return Err(anyhow::anyhow!("{}:{}: empty gene identifier", file, line));
            }
            let weight = value.parse::<f64>().map_err(|_| {
                anyhow::anyhow!(
                    "{}:{}: cannot parse weight `{}` of gene {}",
                    file,
                    line,
                    value,
                    gene
                )
            })?;
            pairs.push((Box::from(gene), weight));
        }

        let (ret, ndup) = Self::from_pairs(pairs);
        if ndup > 0 {
            warn!(
                "{} duplicated gene rows in {}; the last row of each gene is used",
                ndup, file
            );
        }
        info!("read {} gene weights from {}", ret.len(), file);
        Ok(ret)
    }

    pub fn to_tsv(&self, file: &str, gene_column: &str, weight_column: &str) -> anyhow::Result<()> {
        let mut lines: Vec<Box<str>> = Vec::with_capacity(self.len() + 1);
        lines.push(format!("{}\t{}", gene_column, weight_column).into());
        for (g, w) in self.iter() {
            lines.push(format!("{}\t{}", g, w).into());
        }
        write_lines(&lines, file)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn get(&self, gene: &str) -> Option<f64> {
        self.index.get(gene).map(|&k| self.weights[k])
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.index.contains_key(gene)
    }

    pub fn genes(&self) -> &[Box<str>] {
        &self.genes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.genes
            .iter()
            .zip(self.weights.iter())
            .map(|(g, &w)| (g.as_ref(), w))
    }
}
