use super::Result;
use flate2::read::MultiGzDecoder;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read as ioRead};
use std::path::Path;

/// Opens a plain or gzipped text file; `-` reads standard input.
pub fn open_text_reader(path: &Path) -> Result<BufReader<Box<dyn ioRead + Send>>> {
    fn is_gzipped(path: &Path) -> bool {
        let path_str = path.to_string_lossy().to_lowercase();
        path_str.ends_with(".gz") || path_str.ends_with(".gzip")
    }
    if path.as_os_str() == "-" {
        return Ok(BufReader::new(Box::new(io::stdin())));
    }
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if is_gzipped(path) {
        let gz_decoder = MultiGzDecoder::new(file);
        if gz_decoder.header().is_some() {
            Ok(BufReader::new(Box::new(gz_decoder)))
        } else {
            Err(format!("Invalid gzip header: {}", path.to_string_lossy()))
        }
    } else {
        Ok(BufReader::new(Box::new(file)))
    }
}

/// Reads one read name per line, ignoring blank lines and `#` comments.
pub fn read_name_set(path: &Path) -> Result<HashSet<String>> {
    let reader = open_text_reader(path)?;
    let mut names = HashSet::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Error reading line {}: {}", line_number + 1, e))?;
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        names.insert(name.to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn read_names_from_plain_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetal_reads.txt");
        std::fs::write(&path, "# header\nread1\n\nread2\nread1\n").unwrap();
        let names = read_name_set(&path).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("read1"));
        assert!(names.contains("read2"));
    }

    #[test]
    fn read_names_from_gzipped_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetal_reads.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"readA\nreadB\n").unwrap();
        encoder.finish().unwrap();
        let names = read_name_set(&path).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("readB"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(open_text_reader(Path::new("/nonexistent/trace.txt")).is_err());
    }
}
