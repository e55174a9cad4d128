use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, Group, Location};
use ndarray::{ArrayBase, Data, Dim, RawData};

/// Read strings from `HDF5` dataset
pub fn read_hdf5_strings(data: &Dataset) -> anyhow::Result<Vec<Box<str>>> {
    let desc = data.dtype()?.to_descriptor()?;

    let ret: Vec<Box<str>> = match desc {
        TypeDescriptor::VarLenUnicode => ndarray_into_box_str(&data.read_1d::<VarLenUnicode>()?),
        TypeDescriptor::VarLenAscii => ndarray_into_box_str(&data.read_1d::<VarLenAscii>()?),
        TypeDescriptor::FixedAscii(n) => {
            if n < 24 {
                ndarray_into_box_str(&data.read_1d::<FixedAscii<24>>()?)
            } else if n < 128 {
                ndarray_into_box_str(&data.read_1d::<FixedAscii<128>>()?)
            } else {
                ndarray_into_box_str(&data.read_1d::<FixedAscii<1024>>()?)
            }
        }
        TypeDescriptor::FixedUnicode(n) => {
            if n < 24 {
                ndarray_into_box_str(&data.read_1d::<FixedUnicode<24>>()?)
            } else if n < 128 {
                ndarray_into_box_str(&data.read_1d::<FixedUnicode<128>>()?)
            } else {
                ndarray_into_box_str(&data.read_1d::<FixedUnicode<1024>>()?)
            }
        }
        other => {
            return Err(anyhow::anyhow!(
                "{} does not hold strings: {:?}",
                data.name(),
                other
            ));
        }
    };

    Ok(ret)
}

/// Read a numeric or boolean vector as `f32`
pub fn read_hdf5_numbers(data: &Dataset) -> anyhow::Result<Vec<f32>> {
    match data.dtype()?.to_descriptor()? {
        TypeDescriptor::Boolean => Ok(data
            .read_1d::<bool>()?
            .iter()
            .map(|&b| if b { 1.0 } else { 0.0 })
            .collect()),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_) => {
            Ok(data.read_1d::<f64>()?.iter().map(|&x| x as f32).collect())
        }
        other => Err(anyhow::anyhow!(
            "{} is not numeric: {:?}",
            data.name(),
            other
        )),
    }
}

/// Whether a dataset holds strings of any storage flavour
pub fn is_string_dataset(data: &Dataset) -> anyhow::Result<bool> {
    Ok(matches!(
        data.dtype()?.to_descriptor()?,
        TypeDescriptor::VarLenUnicode
            | TypeDescriptor::VarLenAscii
            | TypeDescriptor::FixedAscii(_)
            | TypeDescriptor::FixedUnicode(_)
    ))
}

fn ndarray_into_box_str<T, U>(data: &ArrayBase<T, Dim<[usize; 1]>>) -> Vec<Box<str>>
where
    T: RawData<Elem = U> + Data,
    U: ToString,
{
    data.iter()
        .map(|x| x.to_string().into_boxed_str())
        .collect()
}

pub fn has_attr(loc: &Location, name: &str) -> anyhow::Result<bool> {
    Ok(loc.attr_names()?.iter().any(|x| x == name))
}

/// Read a scalar string attribute; `None` if there is no such
/// attribute
pub fn read_string_attr(loc: &Location, name: &str) -> anyhow::Result<Option<Box<str>>> {
    if !has_attr(loc, name)? {
        return Ok(None);
    }
    let attr = loc.attr(name)?;
    let ret = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => attr.read_scalar::<VarLenUnicode>()?.to_string(),
        TypeDescriptor::VarLenAscii => attr.read_scalar::<VarLenAscii>()?.to_string(),
        TypeDescriptor::FixedAscii(_) => attr.read_scalar::<FixedAscii<256>>()?.to_string(),
        TypeDescriptor::FixedUnicode(_) => attr.read_scalar::<FixedUnicode<256>>()?.to_string(),
        other => {
            return Err(anyhow::anyhow!(
                "attribute {} is not a string: {:?}",
                name,
                other
            ))
        }
    };
    Ok(Some(ret.into_boxed_str()))
}

/// Read an integer vector attribute such as a matrix `shape`
pub fn read_usize_attr(loc: &Location, name: &str) -> anyhow::Result<Vec<usize>> {
    let values = loc.attr(name)?.read_1d::<i64>()?;
    values
        .iter()
        .map(|&x| {
            usize::try_from(x)
                .map_err(|_| anyhow::anyhow!("negative value {} in attribute {}", x, name))
        })
        .collect()
}

fn to_varlen(value: &str) -> anyhow::Result<VarLenUnicode> {
    value
        .parse::<VarLenUnicode>()
        .map_err(|e| anyhow::anyhow!("invalid string {:?}: {:?}", value, e))
}

pub fn write_string_attr(loc: &Location, name: &str, value: &str) -> anyhow::Result<()> {
    loc.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&to_varlen(value)?)?;
    Ok(())
}

pub fn write_string_array_attr(
    loc: &Location,
    name: &str,
    values: &[Box<str>],
) -> anyhow::Result<()> {
    let values = values
        .iter()
        .map(|x| to_varlen(x))
        .collect::<anyhow::Result<Vec<_>>>()?;
    loc.new_attr::<VarLenUnicode>()
        .shape(values.len())
        .create(name)?
        .write(&values)?;
    Ok(())
}

/// Tag an element with anndata's `encoding-type` and
/// `encoding-version` attributes
pub fn write_encoding(loc: &Location, encoding_type: &str, version: &str) -> anyhow::Result<()> {
    write_string_attr(loc, "encoding-type", encoding_type)?;
    write_string_attr(loc, "encoding-version", version)?;
    Ok(())
}

/// Write a vector of strings as a variable-length UTF-8 dataset
pub fn write_hdf5_strings(
    group: &Group,
    key: &str,
    values: &[Box<str>],
) -> anyhow::Result<Dataset> {
    let values = values
        .iter()
        .map(|x| to_varlen(x))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let ds = group
        .new_dataset::<VarLenUnicode>()
        .shape(values.len())
        .create(key)?;
    ds.write(&values)?;
    write_encoding(&ds, "string-array", "0.2.0")?;
    Ok(ds)
}
