use std::collections::BTreeMap;

/// Category code of a cell without a label
pub const MISSING_CODE: i32 = -1;

/// One per-cell annotation column
#[derive(Clone, Debug, PartialEq)]
pub enum ObsColumn {
    /// `codes[i]` indexes `categories`, or is [`MISSING_CODE`]
    Categorical {
        codes: Vec<i32>,
        categories: Vec<Box<str>>,
    },
    Numeric(Vec<f32>),
}

impl ObsColumn {
    /// Encode string labels as a categorical column with lexically
    /// sorted categories
    pub fn categorical_from_labels(labels: &[Box<str>]) -> Self {
        let mut categories = labels.to_vec();
        categories.sort();
        categories.dedup();
        let codes = labels
            .iter()
            .map(|x| categories.binary_search(x).map(|k| k as i32).unwrap_or(MISSING_CODE))
            .collect();
        ObsColumn::Categorical { codes, categories }
    }

    pub fn len(&self) -> usize {
        match self {
            ObsColumn::Categorical { codes, .. } => codes.len(),
            ObsColumn::Numeric(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ObsColumn::Categorical { .. } => "categorical",
            ObsColumn::Numeric(_) => "numeric",
        }
    }

    /// Category label of cell `i`
    pub fn label(&self, i: usize) -> Option<&str> {
        match self {
            ObsColumn::Categorical { codes, categories } => {
                let code = *codes.get(i)?;
                if code < 0 {
                    None
                } else {
                    categories.get(code as usize).map(|x| x.as_ref())
                }
            }
            ObsColumn::Numeric(_) => None,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let ObsColumn::Categorical { codes, categories } = self {
            let ncat = categories.len() as i32;
            if let Some(&bad) = codes.iter().find(|&&c| c < MISSING_CODE || c >= ncat) {
                return Err(anyhow::anyhow!(
                    "category code {} out of range for {} categories",
                    bad,
                    ncat
                ));
            }
        }
        Ok(())
    }
}

/// Named per-cell annotation columns, all of the same length
#[derive(Clone, Debug, Default)]
pub struct CellAnnotations {
    ncells: usize,
    columns: BTreeMap<Box<str>, ObsColumn>,
}

impl CellAnnotations {
    pub fn new(ncells: usize) -> Self {
        Self {
            ncells,
            columns: BTreeMap::new(),
        }
    }

    pub fn ncells(&self) -> usize {
        self.ncells
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> Vec<Box<str>> {
        self.columns.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObsColumn)> {
        self.columns.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ObsColumn> {
        self.columns.get(name)
    }

    /// Add or replace a column, returning the replaced one
    pub fn insert(&mut self, name: &str, column: ObsColumn) -> anyhow::Result<Option<ObsColumn>> {
        if column.len() != self.ncells {
            return Err(anyhow::anyhow!(
                "column `{}` has {} values for {} cells",
                name,
                column.len(),
                self.ncells
            ));
        }
        column.validate()?;
        Ok(self.columns.insert(name.into(), column))
    }

    /// Codes and categories of a categorical column
    pub fn categorical(&self, name: &str) -> anyhow::Result<(&[i32], &[Box<str>])> {
        match self.columns.get(name) {
            Some(ObsColumn::Categorical { codes, categories }) => Ok((codes, categories)),
            Some(other) => Err(anyhow::anyhow!(
                "annotation `{}` is {}, expected categorical",
                name,
                other.kind()
            )),
            None => Err(self.missing(name)),
        }
    }

    pub fn numeric(&self, name: &str) -> anyhow::Result<&[f32]> {
        match self.columns.get(name) {
            Some(ObsColumn::Numeric(x)) => Ok(x),
            Some(other) => Err(anyhow::anyhow!(
                "annotation `{}` is {}, expected numeric",
                name,
                other.kind()
            )),
            None => Err(self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> anyhow::Error {
        let names: Vec<&str> = self.columns.keys().map(|x| x.as_ref()).collect();
        anyhow::anyhow!(
            "annotation `{}` not found; available: [{}]",
            name,
            names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<Box<str>> {
        xs.iter().map(|&x| x.into()).collect()
    }

    #[test]
    fn categories_are_sorted() {
        let col = ObsColumn::categorical_from_labels(&labels(&["T", "B", "T", "NK"]));
        match &col {
            ObsColumn::Categorical { codes, categories } => {
                assert_eq!(categories, &labels(&["B", "NK", "T"]));
                assert_eq!(codes, &vec![2, 0, 2, 1]);
            }
            _ => panic!("expected categorical"),
        }
        assert_eq!(col.label(1), Some("B"));
    }

    #[test]
    fn typed_access_and_validation() -> anyhow::Result<()> {
        let mut obs = CellAnnotations::new(3);
        obs.insert("score", ObsColumn::Numeric(vec![0.0, 1.0, 2.0]))?;
        obs.insert(
            "cell_type",
            ObsColumn::Categorical {
                codes: vec![0, MISSING_CODE, 1],
                categories: labels(&["a", "b"]),
            },
        )?;

        assert_eq!(obs.numeric("score")?, &[0.0, 1.0, 2.0]);
        assert_eq!(obs.get("cell_type").and_then(|c| c.label(1)), None);
        assert!(obs.categorical("score").is_err());
        assert!(obs.numeric("cell_type").is_err());
        assert!(obs.numeric("nothing").is_err());

        assert!(obs.insert("short", ObsColumn::Numeric(vec![1.0])).is_err());
        let bad = ObsColumn::Categorical {
            codes: vec![0, 0, 2],
            categories: labels(&["a", "b"]),
        };
        assert!(obs.insert("bad", bad).is_err());

        let old = obs.insert("score", ObsColumn::Numeric(vec![5.0, 5.0, 5.0]))?;
        assert!(old.is_some());
        assert_eq!(obs.num_columns(), 2);
        Ok(())
    }
}
