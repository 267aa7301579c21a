use std::{
    collections::HashMap,
    fs,
    io::{Error, ErrorKind, Result},
    path::Path,
    sync::LazyLock,
};

use regex::{NoExpand, Regex};
use serde::Deserialize;
use tracing::{info, warn};

/// Model path to README token table, a `[tokens]` table in a TOML file:
///
/// ```toml
/// [tokens]
/// "/artpec8/mobilenet_v2_1.0_224_quant.tflite" = "A8_tf1_mnv2"
/// ```
#[derive(Debug, Deserialize)]
pub struct TokenMap {
    tokens: HashMap<String, String>,
}

impl TokenMap {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
    }

    pub fn token_for(&self, model: &str) -> Option<&str> {
        self.tokens.get(model).map(String::as_str)
    }
}

static RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"result: \./models(\S+\.(?:tflite|bin)) .*? job: (\d+\.?\d*) ms")
        .expect("literal regex")
});

/// `(model path, mean milliseconds)` pairs scraped from a larod-client log.
/// The millisecond value is kept as scraped, not reparsed.
pub fn extract_inference_times(log: &str) -> Vec<(String, String)> {
    RESULT_RE
        .captures_iter(log)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

/// Replace the `<!--token--> .. <!--end_token-->` span with the measured
/// value. `None` when the README does not carry the token.
pub fn splice_value(readme: &str, token: &str, value_ms: &str) -> Option<String> {
    let re = Regex::new(&format!(
        "(?s)<!--{t}-->.*?<!--end_{t}-->",
        t = regex::escape(token)
    ))
    .expect("escaped token regex");
    if !re.is_match(readme) {
        return None;
    }
    let section = format!("<!--{token}--> {value_ms} ms <!--end_{token}-->");
    Some(re.replace_all(readme, NoExpand(&section)).into_owned())
}

/// Splice one value into the README on disk. Errors when the token is not
/// present.
pub fn splice_file(readme_path: &Path, token: &str, value_ms: &str) -> Result<()> {
    let readme = fs::read_to_string(readme_path)?;
    match splice_value(&readme, token, value_ms) {
        Some(updated) => fs::write(readme_path, updated),
        None => Err(Error::new(
            ErrorKind::NotFound,
            format!("token {token} not found in {}", readme_path.display()),
        )),
    }
}

/// Read a larod-client log, map each measured model to its README token and
/// rewrite the README in place. Tokens missing from the README or the log
/// are warnings, not errors.
pub fn update(readme_path: &Path, log_path: &Path, map: &TokenMap) -> Result<()> {
    let mut readme = fs::read_to_string(readme_path)?;
    let log = fs::read_to_string(log_path)?;
    let mut changed = false;
    for (model, ms) in extract_inference_times(&log) {
        let Some(token) = map.token_for(&model) else {
            warn!("No README token mapped for model {model}");
            continue;
        };
        match splice_value(&readme, token, &ms) {
            Some(updated) => {
                info!("Found token in file: {token}");
                readme = updated;
                changed = true;
            }
            None => warn!("Can't find token in file: {token}"),
        }
    }
    if changed {
        fs::write(readme_path, readme)?;
    }
    Ok(())
}
