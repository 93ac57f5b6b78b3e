
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes `body` gzip-compressed to `dir/name`.
pub(crate) fn write_gz(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
    path
}
