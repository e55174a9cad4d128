use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub struct ReadLinesOut<T> {
    /// parsed words of each data line
    pub lines: Vec<Vec<T>>,
    /// 1-based line numbers in the file, parallel to `lines`
    pub line_numbers: Vec<usize>,
    pub header: Vec<Box<str>>,
}

///
/// Read a delimited text file into words.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - column delimiter
/// * `hdr_line` - location of a header line (-1 = no header line)
///
/// Empty lines and lines starting with `#` are skipped.
///
pub fn read_lines_of_words_delim(
    input_file: &str,
    delim: &str,
    hdr_line: i64,
) -> anyhow::Result<ReadLinesOut<Box<str>>> {
    let split = |line: &str| -> Vec<Box<str>> { line.split(delim).map(Box::from).collect() };
    let buf = open_buf_reader(input_file)?;

    let mut header = vec![];
    let mut lines = vec![];
    let mut line_numbers = vec![];
    let mut data_line = 0_i64;

    for (i, line) in buf.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if data_line == hdr_line {
            header = split(line);
        } else if data_line > hdr_line {
            lines.push(split(line));
            line_numbers.push(i + 1);
        }
        data_line += 1;
    }

    if hdr_line >= 0 && header.is_empty() {
        return Err(anyhow::anyhow!("no header line found in {}", input_file));
    }

    Ok(ReadLinesOut {
        lines,
        line_numbers,
        header,
    })
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not, or `stdout`
///
pub fn write_lines(lines: &[Box<str>], output_file: &str) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(anyhow::anyhow!("failed to write {}: {}", output_file, e));
        }
    }
    buf.flush()?;
    Ok(())
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;

    match Path::new(input_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not, or `stdout`
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    mkdir_parent(output_file)?;
    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;

    match Path::new(output_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => Ok(Box::new(BufWriter::new(file))),
    }
}

///
/// Create the parent directory of a file if needed
/// * `file` - file name
///
pub fn mkdir_parent(file: &str) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

///
/// Create a file with the `suffix` in the system temporary directory.
/// The file is kept on disk; remove it with [`remove_file`].
///
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<std::path::PathBuf> {
    let temp_file = tempfile::Builder::new()
        .prefix("gzsper")
        .suffix(suffix)
        .tempfile()?
        .into_temp_path()
        .keep()?;
    Ok(temp_file)
}

///
/// Remove a file or directory if it exists
/// * `file` - file name
///
pub fn remove_file(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if path.is_file() {
        std::fs::remove_file(path)?;
    } else if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_tsv_with_header_and_comments() -> anyhow::Result<()> {
        let tsv = create_temp_dir_file(".tsv.gz")?;
        let tsv = tsv.to_str().unwrap();

        let lines: Vec<Box<str>> = vec![
            "# comment".into(),
            "GENE\tMI".into(),
            "A\t1.5".into(),
            "".into(),
            "B\t-2".into(),
        ];
        write_lines(&lines, tsv)?;

        let out = read_lines_of_words_delim(tsv, "\t", 0)?;
        assert_eq!(out.header, vec![Box::from("GENE"), Box::from("MI")]);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[1][0].as_ref(), "B");
        assert_eq!(out.line_numbers, vec![3, 5]);

        remove_file(tsv)?;
        Ok(())
    }

    #[test]
    fn header_is_required_when_requested() -> anyhow::Result<()> {
        let tsv = create_temp_dir_file(".tsv")?;
        let tsv = tsv.to_str().unwrap();
        write_lines(&[], tsv)?;
        assert!(read_lines_of_words_delim(tsv, "\t", 0).is_err());
        remove_file(tsv)?;
        Ok(())
    }
}
