use std::{
    fs::{self, File},
    io::{self, Error, ErrorKind, Read, Result},
    net::TcpStream,
    path::Path,
    sync::LazyLock,
};

use clap::ValueEnum;
use regex::Regex;
use serde::Deserialize;
use ssh2::Session;
use tracing::{error, info};

/// Chipset argument, mapped to the device name larod-client expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Chip {
    #[value(name = "CPU")]
    Cpu,
    #[value(name = "A8-DLPU")]
    A8Dlpu,
    #[value(name = "A7-DLPU")]
    A7Dlpu,
    #[value(name = "CV25")]
    Cv25,
}

impl Chip {
    pub fn larod_device(self) -> &'static str {
        match self {
            Chip::Cpu => "cpu-tflite",
            Chip::A8Dlpu => "axis-a8-dlpu-tflite",
            Chip::A7Dlpu => "google-edge-tpu-tflite",
            Chip::Cv25 => "ambarella-cvflow",
        }
    }
}

/// Camera connection settings, read from a TOML file or assembled from CLI
/// flags.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "ip")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(rename = "name")]
    pub username: String,
    #[serde(rename = "pwd")]
    pub password: String,
}

fn default_port() -> u16 {
    22
}

impl DeviceConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
    }
}

pub struct SpeedTest {
    config: DeviceConfig,
}

impl SpeedTest {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    /// Upload the model to the camera, run larod-client for `duration`
    /// iterations on `chip` and return the mean execution time in
    /// milliseconds. When `input_size` is given, a random input tensor of
    /// that many bytes is generated on the device first.
    pub fn run(
        &self,
        model_path: &Path,
        duration: u32,
        chip: Chip,
        input_size: Option<[u32; 3]>,
    ) -> Result<f32> {
        let model_name = model_path
            .file_name()
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "model path has no file name"))?
            .to_string_lossy()
            .into_owned();
        let remote_model = format!("/tmp/{model_name}");

        info!("Testing model: {model_name}");
        info!(
            "Connecting to camera at {} and port {}",
            self.config.host, self.config.port
        );
        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port))?;
        let mut sess = Session::new()?;
        sess.set_tcp_stream(tcp);
        sess.handshake()?;
        sess.userauth_password(&self.config.username, &self.config.password)?;

        info!("Loading model...");
        let sftp = sess.sftp()?;
        let mut remote = sftp.create(Path::new(&remote_model))?;
        let mut local = File::open(model_path)?;
        io::copy(&mut local, &mut remote)?;
        drop(remote);

        let input = match input_size {
            Some(dims) => {
                info!("Generating input...");
                let bytes: u32 = dims.iter().product();
                exec(&sess, &format!("dd if=/dev/urandom of=rand.in bs={bytes} count=1"))?;
                "rand.in"
            }
            None => "''",
        };

        info!("Starting test...");
        let cmd = format!(
            "larod-client -R {duration} -p -c {} -g {remote_model} -i {input}",
            chip.larod_device()
        );
        let (stdout, stderr) = exec(&sess, &cmd)?;

        info!("Parsing the output...");
        let time = parse_mean_time(&stdout).ok_or_else(|| {
            error!("Something went wrong:");
            error!("{stdout}");
            error!("{stderr}");
            Error::new(
                ErrorKind::InvalidData,
                "no mean execution time in larod-client output",
            )
        });

        // Clean up even when the scrape failed.
        info!("Cleaning...");
        exec(&sess, &format!("rm -f rand.in rand.in.out0 {remote_model}"))?;
        time
    }
}

fn exec(sess: &Session, cmd: &str) -> Result<(String, String)> {
    let mut channel = sess.channel_session()?;
    channel.exec(cmd)?;
    let mut stdout = String::new();
    channel.read_to_string(&mut stdout)?;
    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr)?;
    channel.wait_close()?;
    Ok((stdout, stderr))
}

static MS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("literal regex"));

/// Last fractional number on the `Mean execution time for job:` line. Log
/// lines carry timestamps with the same shape, so only the last match on the
/// line is the measurement.
pub fn parse_mean_time(output: &str) -> Option<f32> {
    let line = output
        .lines()
        .find(|l| l.contains("Mean execution time for job:"))?;
    info!("{line}");
    MS_RE.find_iter(line).last()?.as_str().parse().ok()
}
