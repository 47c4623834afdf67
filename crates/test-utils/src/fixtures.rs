//! Fixture builders: archives, NPZ bundles and flat images on disk.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{ArrayBase, Data, Dimension};
use ndarray_npy::{NpzWriter, WritableElement};

/// Entries used by the archive fixtures: `(name, contents)`.
pub const ARCHIVE_ENTRIES: [(&str, &[u8]); 2] = [
    ("readme.txt", b"earthnet sample\n"),
    ("nested/values.csv", b"a,b\n1,2\n"),
];

/// Write a zip archive with the given entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> io::Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(path)?);
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        zip.start_file(*name, options).map_err(io::Error::other)?;
        zip.write_all(contents)?;
    }
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

/// Write a tar archive, gzip-compressed when `gzip` is set.
pub fn write_tar(path: &Path, entries: &[(&str, &[u8])], gzip: bool) -> io::Result<()> {
    let file = File::create(path)?;
    if gzip {
        let encoder = GzEncoder::new(file, Compression::default());
        let encoder = append_entries(tar::Builder::new(encoder), entries)?;
        encoder.finish()?;
    } else {
        append_entries(tar::Builder::new(file), entries)?;
    }
    Ok(())
}

fn append_entries<W: Write>(
    mut builder: tar::Builder<W>,
    entries: &[(&str, &[u8])],
) -> io::Result<W> {
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents)?;
    }
    builder.into_inner()
}

/// Write an uncompressed `.npz` bundle with arrays stored as `<name>.npy`.
pub fn write_npz<A, S, D>(path: &Path, arrays: &[(&str, &ArrayBase<S, D>)]) -> io::Result<()>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    fill_npz(NpzWriter::new(File::create(path)?), arrays)
}

/// Write a deflated `.npz` bundle, as `numpy.savez_compressed` does.
pub fn write_npz_compressed<A, S, D>(
    path: &Path,
    arrays: &[(&str, &ArrayBase<S, D>)],
) -> io::Result<()>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    fill_npz(NpzWriter::new_compressed(File::create(path)?), arrays)
}

fn fill_npz<A, S, D>(mut npz: NpzWriter<File>, arrays: &[(&str, &ArrayBase<S, D>)]) -> io::Result<()>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    for (name, array) in arrays {
        npz.add_array(format!("{}.npy", name), *array)
            .map_err(io::Error::other)?;
    }
    npz.finish().map_err(io::Error::other)?;
    Ok(())
}

/// Write a single-entry `.npz` holding `values` as little-endian float16.
///
/// `ndarray-npy` cannot write half floats, so the NPY header is built here.
pub fn write_npz_f16(path: &Path, name: &str, shape: &[usize], values: &[f32]) -> io::Result<()> {
    let dims = match shape {
        [single] => format!("({},)", single),
        _ => format!(
            "({})",
            shape.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '<f2', 'fortran_order': False, 'shape': {}, }}",
        dims
    );
    // magic, version and length take 10 bytes; the header pads the total to 64
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut npy = Vec::with_capacity(10 + header.len() + values.len() * 2);
    npy.extend_from_slice(b"\x93NUMPY\x01\x00");
    npy.extend_from_slice(&(header.len() as u16).to_le_bytes());
    npy.extend_from_slice(header.as_bytes());
    for value in values {
        npy.extend_from_slice(&half::f16::from_f32(*value).to_le_bytes());
    }

    let mut zip = zip::ZipWriter::new(File::create(path)?);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip.start_file(format!("{}.npy", name), options)
        .map_err(io::Error::other)?;
    zip.write_all(&npy)?;
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

/// Write an RGB PNG (or any format the extension selects).
pub fn write_rgb_image(path: &Path, width: u32, height: u32) -> image::ImageResult<()> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 10 % 256) as u8, (y * 10 % 256) as u8, 128])
    });
    img.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("a.zip"), &ARCHIVE_ENTRIES).unwrap();
        write_tar(&dir.path().join("a.tar"), &ARCHIVE_ENTRIES, false).unwrap();
        write_tar(&dir.path().join("a.tar.gz"), &ARCHIVE_ENTRIES, true).unwrap();
        write_rgb_image(&dir.path().join("a.png"), 8, 4).unwrap();

        for name in ["a.zip", "a.tar", "a.tar.gz", "a.png"] {
            let len = std::fs::metadata(dir.path().join(name)).unwrap().len();
            assert!(len > 0, "{} is empty", name);
        }
    }
}
