use std::{fs, io::Result, path::Path};

use tracing::info;

/// Copy every file in `images` into `output` (created if absent), renamed to
/// the last `_`-separated segment of the file name with leading zeros
/// stripped. Returns the number of files copied.
pub fn strip_numeric_prefixes(images: &Path, output: &Path) -> Result<u32> {
    fs::create_dir_all(output)?;
    let mut copied = 0;
    for entry in fs::read_dir(images)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let renamed = stripped_name(&name.to_string_lossy());
        fs::copy(entry.path(), output.join(&renamed))?;
        info!("{} -> {renamed}", entry.path().display());
        copied += 1;
    }
    Ok(copied)
}

/// `img_000123.jpg` becomes `123.jpg`. An all-zero stem keeps its segment
/// unstripped instead of collapsing to a bare extension.
pub fn stripped_name(name: &str) -> String {
    let segment = name.rsplit('_').next().unwrap_or(name);
    let stripped = segment.trim_start_matches('0');
    if stripped.is_empty() || stripped.starts_with('.') {
        segment.to_string()
    } else {
        stripped.to_string()
    }
}
