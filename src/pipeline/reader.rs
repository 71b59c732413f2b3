use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{PipelineError, Result};

const BUFFER_SIZE: usize = 64 * 1024;

/// Opens a text input from a file path.
/// Automatically detects .gz files and applies gzip decompression.
pub fn open_text_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open {}: {}", path.display(), e),
        ))
    })?;

    let reader: Box<dyn BufRead + Send> = if is_gzipped(path) {
        // Gzipped file: File -> GzDecoder -> BufReader
        let decoder = GzDecoder::new(file);
        Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder))
    } else {
        Box::new(BufReader::with_capacity(BUFFER_SIZE, file))
    };

    Ok(reader)
}

pub fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Lower-cased extension, looking through a trailing `.gz`.
pub fn inner_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
}
