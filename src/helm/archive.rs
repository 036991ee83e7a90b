use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;

/// Entry count and uncompressed size of a gzipped tar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub bytes: u64,
}

/// Walk a gzipped tar fully without writing anything, so truncated streams
/// and checksum mismatches surface as errors.
pub fn inspect(data: &[u8]) -> io::Result<ArchiveSummary> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    let mut summary = ArchiveSummary { entries: 0, bytes: 0 };
    for entry in archive.entries()? {
        let mut entry = entry?;
        summary.bytes += io::copy(&mut entry, &mut io::sink())?;
        summary.entries += 1;
    }
    // Trailing garbage after the tar end marker still has to decompress.
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink())?;
    if summary.entries == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "archive is empty"));
    }
    Ok(summary)
}

/// Unpack a gzipped tar under `dest`, refusing entries that would land
/// outside it.
pub fn extract(data: &[u8], dest: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.unpack_in(dest)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {} escapes the archive root", entry.path()?.display()),
            ));
        }
        count += 1;
    }
    if count == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "archive is empty"));
    }
    Ok(count)
}

/// [`extract`] on the blocking pool.
pub async fn unpack(data: &[u8], dest: &Path) -> io::Result<usize> {
    let data = data.to_vec();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract(&data, &dest))
        .await
        .map_err(io::Error::other)?
}

/// Read a whole file out of a gzipped tar by its path inside the archive.
pub fn read_entry(data: &[u8], wanted: &str) -> io::Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_string_lossy().trim_start_matches("./") == wanted {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}
