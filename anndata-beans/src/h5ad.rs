use crate::anndata::ExpressionData;
use crate::annotations::{CellAnnotations, ObsColumn};
use crate::expr_matrix::{ExprMatrix, IndexPointerType, ValuesIndicesPointers};
use crate::misc::*;

use anyhow::Context;
use hdf5::{Group, H5Type};
use log::{info, warn};
use matrix_util::common_io::mkdir_parent;
use nalgebra::DMatrix;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Read an AnnData `.h5ad` file.
///
/// `X` can be a dense 2D dataset or a sparse group (`data`, `indices`,
/// `indptr`) tagged either by `encoding-type` (`csr_matrix`,
/// `csc_matrix`) or by the older `h5sparse_format` attribute. Cell and
/// gene names come from the `obs` and `var` dataframes; `obs` columns
/// become [`CellAnnotations`]; 2D arrays under `obsm` become
/// embeddings.
pub fn read_h5ad(h5ad_file: &str) -> anyhow::Result<ExpressionData> {
    let file = hdf5::File::open(h5ad_file)
        .with_context(|| format!("failed to open h5ad file {}", h5ad_file))?;
    info!("Opened AnnData h5ad file: {}", h5ad_file);

    let x = read_x(&file).with_context(|| format!("failed to read X of {}", h5ad_file))?;
    let (nn, mm) = (x.nrows(), x.ncols());
    info!(
        "X: {} cells x {} genes, {}",
        nn,
        mm,
        if x.is_sparse() { "sparse" } else { "dense" }
    );

    let (obs_names, obs) = match file.group("obs") {
        Ok(obs_group) => (
            read_dataframe_index(&obs_group, nn)?,
            read_dataframe_columns(&obs_group, nn)?,
        ),
        Err(_) => {
            warn!("obs not found, using numeric cell names");
            (numeric_names(nn), CellAnnotations::new(nn))
        }
    };

    let var_names = match file.group("var") {
        Ok(var_group) => read_dataframe_index(&var_group, mm)?,
        Err(_) => {
            warn!("var not found, using numeric gene names");
            numeric_names(mm)
        }
    };

    info!(
        "Read {} obs columns: {:?}",
        obs.num_columns(),
        obs.names()
    );

    let mut data = ExpressionData::new(x, obs_names, var_names, obs)?;

    if let Ok(obsm_group) = file.group("obsm") {
        data.obsm = read_obsm(&obsm_group, nn)?;
    }

    Ok(data)
}

fn read_x(root: &Group) -> anyhow::Result<ExprMatrix> {
    if let Ok(x_group) = root.group("X") {
        let encoding = match read_string_attr(&x_group, "encoding-type")? {
            Some(x) => x,
            None => read_string_attr(&x_group, "h5sparse_format")?.unwrap_or_default(),
        };

        let pointer_type = if encoding.contains("csr") {
            IndexPointerType::Row
        } else if encoding.contains("csc") {
            IndexPointerType::Column
        } else {
            return Err(anyhow::anyhow!("unsupported X encoding `{}`", encoding));
        };

        let shape = if has_attr(&x_group, "shape")? {
            read_usize_attr(&x_group, "shape")?
        } else {
            read_usize_attr(&x_group, "h5sparse_shape")?
        };
        if shape.len() != 2 {
            return Err(anyhow::anyhow!("X shape has {} dimensions", shape.len()));
        }

        let values = x_group.dataset("data")?.read_1d::<f32>()?.to_vec();
        let indices = x_group.dataset("indices")?.read_1d::<u64>()?.to_vec();
        let indptr = x_group.dataset("indptr")?.read_1d::<u64>()?.to_vec();
        info!(
            "Read {} non-zero elements ({:?}) in {} x {}",
            values.len(),
            pointer_type,
            shape[0],
            shape[1]
        );

        ExprMatrix::from_compressed(
            ValuesIndicesPointers {
                values: &values,
                indices: &indices,
                indptr: &indptr,
            },
            pointer_type,
            (shape[0], shape[1]),
        )
    } else if let Ok(x_data) = root.dataset("X") {
        if x_data.ndim() != 2 {
            return Err(anyhow::anyhow!(
                "dense X must be 2-dimensional, found {} dimensions",
                x_data.ndim()
            ));
        }
        Ok(ExprMatrix::Dense(x_data.read_2d::<f32>()?))
    } else {
        Err(anyhow::anyhow!("no X matrix found"))
    }
}

fn numeric_names(n: usize) -> Vec<Box<str>> {
    (0..n).map(|x| x.to_string().into_boxed_str()).collect()
}

fn index_key(group: &Group) -> anyhow::Result<Box<str>> {
    Ok(read_string_attr(group, "_index")?.unwrap_or_else(|| "_index".into()))
}

fn read_dataframe_index(group: &Group, nexpected: usize) -> anyhow::Result<Vec<Box<str>>> {
    let key = index_key(group)?;
    match group.dataset(&key) {
        Ok(ds) => {
            let names = read_hdf5_strings(&ds)?;
            if names.len() != nexpected {
                return Err(anyhow::anyhow!(
                    "{}/{} has {} names, expected {}",
                    group.name(),
                    key,
                    names.len(),
                    nexpected
                ));
            }
            Ok(names)
        }
        Err(_) => {
            warn!("{}/{} not found, using numeric IDs", group.name(), key);
            Ok(numeric_names(nexpected))
        }
    }
}

fn read_dataframe_columns(group: &Group, ncells: usize) -> anyhow::Result<CellAnnotations> {
    let key = index_key(group)?;
    let mut obs = CellAnnotations::new(ncells);

    for name in group.member_names()? {
        if name.as_str() == key.as_ref() || name == "__categories" {
            continue;
        }
        match read_obs_column(group, &name)
            .with_context(|| format!("failed to read obs column `{}`", name))?
        {
            Some(column) => {
                obs.insert(&name, column)?;
            }
            None => warn!("skipping obs column `{}` of unsupported type", name),
        }
    }
    Ok(obs)
}

fn read_obs_column(group: &Group, name: &str) -> anyhow::Result<Option<ObsColumn>> {
    if let Ok(column) = group.group(name) {
        let encoding = read_string_attr(&column, "encoding-type")?.unwrap_or_default();
        return match encoding.as_ref() {
            "categorical" => Ok(Some(ObsColumn::Categorical {
                codes: read_codes(&column.dataset("codes")?)?,
                categories: read_categories(&column.dataset("categories")?)?,
            })),
            "nullable-integer" | "nullable-boolean" => {
                let values = read_hdf5_numbers(&column.dataset("values")?)?;
                let mask = column.dataset("mask")?.read_1d::<bool>()?;
                Ok(Some(ObsColumn::Numeric(
                    values
                        .into_iter()
                        .zip(mask.iter())
                        .map(|(v, &missing)| if missing { f32::NAN } else { v })
                        .collect(),
                )))
            }
            _ => Ok(None),
        };
    }

    let ds = group.dataset(name)?;
    if ds.ndim() != 1 {
        return Ok(None);
    }

    if is_string_dataset(&ds)? {
        let labels = read_hdf5_strings(&ds)?;
        return Ok(Some(ObsColumn::categorical_from_labels(&labels)));
    }

    // older layout: integer codes with categories kept aside
    if let Ok(categories) = group.dataset(&format!("__categories/{}", name)) {
        return Ok(Some(ObsColumn::Categorical {
            codes: read_codes(&ds)?,
            categories: read_categories(&categories)?,
        }));
    }

    Ok(Some(ObsColumn::Numeric(read_hdf5_numbers(&ds)?)))
}

fn read_codes(ds: &hdf5::Dataset) -> anyhow::Result<Vec<i32>> {
    Ok(ds.read_1d::<i64>()?.iter().map(|&c| c as i32).collect())
}

fn read_categories(ds: &hdf5::Dataset) -> anyhow::Result<Vec<Box<str>>> {
    if is_string_dataset(ds)? {
        read_hdf5_strings(ds)
    } else {
        Ok(read_hdf5_numbers(ds)?
            .into_iter()
            .map(|x| x.to_string().into_boxed_str())
            .collect())
    }
}

fn read_obsm(group: &Group, ncells: usize) -> anyhow::Result<BTreeMap<Box<str>, DMatrix<f32>>> {
    let mut ret = BTreeMap::new();
    for name in group.member_names()? {
        let ds = match group.dataset(&name) {
            Ok(ds) if ds.ndim() == 2 => ds,
            _ => {
                warn!("skipping obsm/{}: not a 2D array", name);
                continue;
            }
        };
        let arr = ds.read_2d::<f32>()?;
        if arr.nrows() != ncells {
            warn!(
                "skipping obsm/{}: {} rows for {} cells",
                name,
                arr.nrows(),
                ncells
            );
            continue;
        }
        let emb = DMatrix::from_row_iterator(arr.nrows(), arr.ncols(), arr.iter().cloned());
        ret.insert(name.into_boxed_str(), emb);
    }
    Ok(ret)
}

/// Write an AnnData `.h5ad` file (anndata >= 0.8 layout) with a CSR
/// `X`, string indices, categorical and numeric `obs` columns and the
/// `obsm` embeddings
pub fn write_h5ad(data: &ExpressionData, h5ad_file: &str) -> anyhow::Result<()> {
    data.validate()?;
    mkdir_parent(h5ad_file)?;

    let file = hdf5::File::create(h5ad_file)
        .with_context(|| format!("failed to create h5ad file {}", h5ad_file))?;
    write_encoding(&file, "anndata", "0.1.0")?;

    write_csr_x(&file, &data.x)?;
    write_dataframe(&file, "obs", &data.obs_names, &data.obs)?;
    write_dataframe(
        &file,
        "var",
        &data.var_names,
        &CellAnnotations::new(data.num_genes()),
    )?;

    let obsm = file.create_group("obsm")?;
    write_encoding(&obsm, "dict", "0.1.0")?;
    for (key, emb) in data.obsm.iter() {
        let arr = Array2::from_shape_fn((emb.nrows(), emb.ncols()), |(i, j)| emb[(i, j)]);
        let ds = obsm
            .new_dataset::<f32>()
            .shape((arr.nrows(), arr.ncols()))
            .create(key.as_ref())?;
        ds.write(&arr)?;
        write_encoding(&ds, "array", "0.2.0")?;
    }

    for key in ["layers", "obsp", "varm", "varp", "uns"] {
        let group = file.create_group(key)?;
        write_encoding(&group, "dict", "0.1.0")?;
    }

    file.flush()?;
    info!("wrote {}", h5ad_file);
    Ok(())
}

fn write_csr_x(root: &Group, x: &ExprMatrix) -> anyhow::Result<()> {
    let (values, indices, indptr) = x.to_csr_parts();

    let x_group = root.create_group("X")?;
    write_encoding(&x_group, "csr_matrix", "0.1.0")?;
    let shape = vec![x.nrows() as i64, x.ncols() as i64];
    x_group
        .new_attr::<i64>()
        .shape(2)
        .create("shape")?
        .write(&shape)?;

    write_array(&x_group, "data", &values)?;
    write_array(&x_group, "indices", &indices)?;
    write_array(&x_group, "indptr", &indptr)?;
    Ok(())
}

fn write_array<T: H5Type>(group: &Group, key: &str, values: &[T]) -> anyhow::Result<()> {
    let ds = group.new_dataset::<T>().shape(values.len()).create(key)?;
    ds.write(values)?;
    Ok(())
}

fn write_dataframe(
    root: &Group,
    key: &str,
    index: &[Box<str>],
    columns: &CellAnnotations,
) -> anyhow::Result<()> {
    let group = root.create_group(key)?;
    write_encoding(&group, "dataframe", "0.2.0")?;
    write_string_attr(&group, "_index", "_index")?;
    write_string_array_attr(&group, "column-order", &columns.names())?;
    write_hdf5_strings(&group, "_index", index)?;

    for (name, column) in columns.iter() {
        match column {
            ObsColumn::Categorical { codes, categories } => {
                let cat_group = group.create_group(name)?;
                write_encoding(&cat_group, "categorical", "0.2.0")?;
                cat_group
                    .new_attr::<bool>()
                    .create("ordered")?
                    .write_scalar(&false)?;
                write_hdf5_strings(&cat_group, "categories", categories)?;
                write_array(&cat_group, "codes", codes)?;
                let codes_ds = cat_group.dataset("codes")?;
                write_encoding(&codes_ds, "array", "0.2.0")?;
            }
            ObsColumn::Numeric(values) => {
                write_array(&group, name, values)?;
                let values_ds = group.dataset(name)?;
                write_encoding(&values_ds, "array", "0.2.0")?;
            }
        }
    }
    Ok(())
}
