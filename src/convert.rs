use std::{
    fs::{self, File},
    io::{BufWriter, Error, ErrorKind, Result, Write},
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageReader, imageops::FilterType};
use tracing::{info, warn};

/// One conversion batch, built from the CLI arguments and validated before
/// any file is touched.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub height: u32,
    pub width: u32,
    /// Directory of input images.
    pub images: PathBuf,
    /// Where derived output files land. The directory must already exist.
    pub out_dir: PathBuf,
    /// Explicit output path, replacing the derived one. Meaningful for
    /// single-file input directories.
    pub output: Option<PathBuf>,
    pub separate_planes: bool,
    pub to_float: bool,
    pub px_div: f32,
    pub px_sub: f32,
    pub alignment: u32,
    pub pitch: u32,
}

/// Per-file result of a batch run. A file that cannot be decoded is skipped
/// with a reason; it never aborts the remaining files.
#[derive(Debug)]
pub enum Outcome {
    Written(PathBuf),
    Skipped { path: PathBuf, reason: String },
}

impl ConvertRequest {
    /// Option conditions, checked once up front. Nothing has been written
    /// when these fail.
    pub fn validate(&self) -> Result<()> {
        if !self.to_float && (self.px_div != 1.0 || self.px_sub != 0.0) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "options --px-division and --px-subtraction require option --float",
            ));
        }
        if self.alignment > 0 && self.pitch > 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "not allowed to use both alignment and pitch",
            ));
        }
        Ok(())
    }

    /// Convert every file in the input directory, one output file per image.
    pub fn run(&self) -> Result<Vec<Outcome>> {
        self.validate()?;
        let mut outcomes = Vec::new();
        for entry in fs::read_dir(&self.images)? {
            let path = entry?.path();
            let img = match decode(&path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("Could not read image {}: {e}", path.display());
                    outcomes.push(Outcome::Skipped {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let out_path = self.output_path(&path);
            self.convert_one(img, &out_path)?;
            info!("Output file written to {}", out_path.display());
            outcomes.push(Outcome::Written(out_path));
        }
        Ok(outcomes)
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => {
                let stem = input.file_stem().unwrap_or_default().to_string_lossy();
                self.out_dir.join(format!("{stem}.bin"))
            }
        }
    }

    fn convert_one(&self, img: DynamicImage, out_path: &Path) -> Result<()> {
        // Output dimensions are exact, not aspect-preserving.
        let img = img
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .into_rgb8();
        let raw = img.as_raw();
        let pitch = self.effective_pitch() as usize;
        let row_len = self.width as usize * 3;

        let mut out = BufWriter::new(File::create(out_path)?);
        if self.separate_planes {
            // All of R, then all of G, then all of B, each plane row-padded
            // on its own.
            for chan in 0..3 {
                for row in raw.chunks_exact(row_len) {
                    let packed = self.pack_row(row.iter().skip(chan).step_by(3).copied());
                    write_row(&mut out, &packed, pitch)?;
                }
            }
        } else {
            for row in raw.chunks_exact(row_len) {
                let packed = self.pack_row(row.iter().copied());
                write_row(&mut out, &packed, pitch)?;
            }
        }
        out.flush()
    }

    /// Size in bytes of one packed output row.
    fn width_bytes(&self) -> u32 {
        let mut width_bytes = self.width;
        if self.to_float {
            // 4 bytes per pixel component.
            width_bytes *= 4;
        }
        if !self.separate_planes {
            // Interleaved, each pixel carries r, g and b data.
            width_bytes *= 3;
        }
        width_bytes
    }

    fn effective_pitch(&self) -> u32 {
        if self.alignment > 0 {
            align_up(self.width_bytes(), self.alignment)
        } else {
            self.pitch
        }
    }

    fn pack_row<I: Iterator<Item = u8>>(&self, components: I) -> Vec<u8> {
        if self.to_float {
            // Subtraction happens before division.
            components
                .flat_map(|v| ((f32::from(v) - self.px_sub) / self.px_div).to_ne_bytes())
                .collect()
        } else {
            components.collect()
        }
    }
}

/// Smallest multiple of `alignment` that fits `width_bytes`.
pub(crate) fn align_up(width_bytes: u32, alignment: u32) -> u32 {
    width_bytes.div_ceil(alignment) * alignment
}

fn decode(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .decode()
        // Decoded pixels are RGB; into_rgb8 later also drops any alpha plane.
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))
}

/// A row lands unpadded when no pitch is requested or the pitch already
/// equals the packed row size. A pitch below the row size pads by nothing
/// rather than truncating.
fn write_row<W: Write>(out: &mut W, row: &[u8], pitch: usize) -> Result<()> {
    if pitch == 0 || pitch == row.len() {
        out.write_all(row)
    } else {
        let mut padded = vec![0u8; pitch.max(row.len())];
        padded[..row.len()].copy_from_slice(row);
        out.write_all(&padded)
    }
}
