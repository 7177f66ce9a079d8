use flate2::read::GzDecoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::tempdir;

/// Either a single string separator or a set of characters, any of
/// which splits a line
pub enum Delimiter {
    Str(String),
    Chars(Vec<char>),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.to_string())
    }
}

impl From<Vec<char>> for Delimiter {
    fn from(chars: Vec<char>) -> Self {
        Delimiter::Chars(chars)
    }
}

impl From<&[char]> for Delimiter {
    fn from(chars: &[char]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl<const N: usize> From<&[char; N]> for Delimiter {
    fn from(chars: &[char; N]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl Delimiter {
    fn split_words(&self, line: &str) -> Vec<Box<str>> {
        match self {
            Delimiter::Str(s) => line.split(s.as_str()).map(Box::from).collect(),
            Delimiter::Chars(chars) => line.split(chars.as_slice()).map(Box::from).collect(),
        }
    }
}

/// Guess a column separator from the file name: `,` for `.csv` or
/// `.csv.gz`, otherwise tab
pub fn detect_delimiter(file_path: &str) -> &'static str {
    if file_path.ends_with(".csv") || file_path.ends_with(".csv.gz") {
        ","
    } else {
        "\t"
    }
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file_path: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file_path)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(anyhow::anyhow!("failed to write {}: {}", output_file_path, e));
        }
    }
    buf.flush()?;
    Ok(())
}

pub struct ReadLinesOut {
    pub lines: Vec<Vec<Box<str>>>,
    pub header: Vec<Box<str>>,
}

///
/// Read lines and split them into words. Lines starting with `#` or
/// `%` and blank lines are skipped.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - delimiter
/// * `hdr_line` - location of a header line (-1 = no header line)
///
pub fn read_lines_of_words_delim(
    input_file: &str,
    delim: impl Into<Delimiter>,
    hdr_line: i64,
) -> anyhow::Result<ReadLinesOut> {
    let delim = delim.into();
    let buf_reader: Box<dyn BufRead> = open_buf_reader(input_file)?;

    let mut lines_raw = vec![];
    for line in buf_reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') || line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        lines_raw.push(line.to_string().into_boxed_str());
    }

    let (header, body) = if hdr_line < 0 {
        (vec![], &lines_raw[..])
    } else {
        let n_skip = hdr_line as usize;
        if lines_raw.len() < n_skip + 1 {
            return Err(anyhow::anyhow!(
                "{}: expected a header at line {}, found {} line(s)",
                input_file,
                n_skip,
                lines_raw.len()
            ));
        }
        (
            delim.split_words(&lines_raw[n_skip]),
            &lines_raw[(n_skip + 1)..],
        )
    };

    // splitting is independent per line; collect keeps the order
    let lines = body
        .par_iter()
        .map(|s| delim.split_words(s))
        .collect::<Vec<_>>();

    Ok(ReadLinesOut { lines, header })
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    match ext {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not; `stdout` and
///   `stderr` are recognized
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    if output_file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(BufWriter::new(std::io::stderr())));
    }

    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;
    match ext {
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
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

///
/// Take the extension of a file, looking through a trailing `.gz`,
/// e.g., `data.tsv.gz` gives `tsv`
/// * `file` - file name
///
pub fn file_ext(file: &str) -> anyhow::Result<Box<str>> {
    let path = Path::new(file);
    let ext = path
        .extension()
        .and_then(|x| x.to_str())
        .ok_or(anyhow::anyhow!("no extension: {}", file))?;

    if ext == "gz" {
        let stem = path
            .file_stem()
            .and_then(|x| x.to_str())
            .ok_or(anyhow::anyhow!("no file stem: {}", file))?;
        let inner = Path::new(stem)
            .extension()
            .and_then(|x| x.to_str())
            .ok_or(anyhow::anyhow!("no extension before .gz: {}", file))?;
        Ok(inner.into())
    } else {
        Ok(ext.into())
    }
}

///
/// Create a temporary directory and suggest a file name
/// * `suffix` - suffix of the file name
///
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<std::path::PathBuf> {
    let temp_dir = tempdir()?.path().to_path_buf();
    std::fs::create_dir_all(&temp_dir)?;
    let temp_file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile_in(temp_dir)?
        .path()
        .to_owned();

    Ok(temp_file)
}

///
/// Remove a file if it exists
/// * `file` - file name
///
pub fn remove_file(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if path.exists() {
        if path.is_file() {
            std::fs::remove_file(path)?;
        } else {
            std::fs::remove_dir_all(path)?;
        }
    }
    Ok(())
}
