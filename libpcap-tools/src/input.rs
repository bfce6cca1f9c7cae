use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use xz2::read::XzDecoder;

/// Read a whole capture file into memory
///
/// Files ending with `.gz`, `.xz` or `.lz4` are decompressed on the fly. The
/// special name `-` reads standard input.
pub fn read_capture_file<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    let path = path.as_ref();
    let mut reader: Box<dyn Read> = if path == Path::new("-") {
        Box::new(io::stdin())
    } else {
        let file = File::open(path).map_err(|e| {
            error!("Could not open input file '{}'", path.display());
            e
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Box::new(GzDecoder::new(file)),
            Some("xz") => Box::new(XzDecoder::new(file)),
            Some("lz4") => Box::new(lz4::Decoder::new(file)?),
            _ => Box::new(file),
        }
    };
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    debug!("read {} bytes from '{}'", data.len(), path.display());
    Ok(data)
}
