use std::{
    io::{self, Error, ErrorKind},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use larodkit::{
    convert::ConvertRequest,
    readme, rename,
    speedtest::{Chip, DeviceConfig, SpeedTest},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read and convert bitmap images to raw bytes
    Convert(ConvertArgs),
    /// Run a speed test of a model on the camera
    Speedtest(SpeedtestArgs),
    /// Splice measured inference times into a README
    ReadmeUpdate(ReadmeUpdateArgs),
    /// Copy image files, stripping numeric prefixes from their names
    Rename(RenameArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Resize IMAGE's height to HEIGHT
    #[arg(value_name = "HEIGHT", value_parser = positive_u32)]
    height: u32,

    /// Resize IMAGE's width to WIDTH
    #[arg(value_name = "WIDTH", value_parser = positive_u32)]
    width: u32,

    /// Directory of input image files
    #[arg(value_name = "IMAGE")]
    images: PathBuf,

    /// Create separated color planes. Default is interleaved RGB colors
    #[arg(short = 'p', long)]
    separate_planes: bool,

    /// Output file name for the converted image. Default is the input image
    /// base name with suffix ".bin" under output/
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Convert pixel values to float (32-bit)
    #[arg(short = 'f', long = "float")]
    to_float: bool,

    /// Divide the pixel values with S when converting to float
    #[arg(
        short = 's',
        long = "px-division",
        value_name = "S",
        default_value_t = 1.0,
        value_parser = non_negative_f32
    )]
    px_div: f32,

    /// Subtract the pixel values with M when converting to float
    #[arg(
        short = 'm',
        long = "px-subtraction",
        value_name = "M",
        default_value_t = 0.0,
        value_parser = non_negative_f32
    )]
    px_sub: f32,

    /// Row alignment in bytes. Rows will be padded to a multiple of the
    /// alignment. Not to be used when pitch is used
    #[arg(short = 'a', long, value_name = "A", default_value_t = 0)]
    alignment: u32,

    /// Row pitch in bytes. Rows will be padded to match the pitch. Not to be
    /// used when alignment is used
    #[arg(short = 'w', long, value_name = "P", default_value_t = 0)]
    pitch: u32,
}

#[derive(Args, Debug)]
struct SpeedtestArgs {
    /// Model path
    #[arg(long)]
    model_path: PathBuf,

    /// Test duration (iterations)
    #[arg(long, default_value_t = 1000)]
    test_duration: u32,

    /// Chipset
    #[arg(long, value_enum, default_value_t = Chip::Cpu)]
    chip: Chip,

    /// Camera connection settings (TOML with ip, port, name, pwd)
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["camera_ip", "camera_username", "camera_password"]
    )]
    config: Option<PathBuf>,

    /// Camera IP
    #[arg(long)]
    camera_ip: Option<String>,

    /// Camera port for ssh
    #[arg(long, default_value_t = 22)]
    camera_port: u16,

    /// Camera Username
    #[arg(long)]
    camera_username: Option<String>,

    /// Camera Password
    #[arg(long)]
    camera_password: Option<String>,

    /// Generate a random input tensor of C H W bytes on the device
    #[arg(long, value_name = "DIM", num_args = 3)]
    input_size: Option<Vec<u32>>,

    /// README to splice the measured time into
    #[arg(long, value_name = "FILE", requires = "token")]
    readme: Option<PathBuf>,

    /// README token marking where the measured time goes
    #[arg(long, requires = "readme")]
    token: Option<String>,
}

#[derive(Args, Debug)]
struct ReadmeUpdateArgs {
    /// README file to rewrite
    #[arg(long, default_value = "README.md")]
    readme: PathBuf,

    /// larod-client log to scrape
    #[arg(long, default_value = "/tmp/larod_out.txt")]
    log: PathBuf,

    /// TOML file mapping model paths to README tokens
    #[arg(long, value_name = "FILE")]
    tokens: PathBuf,
}

#[derive(Args, Debug)]
struct RenameArgs {
    /// Directory of input image files
    images: PathBuf,

    /// Directory to copy renamed files into
    output: PathBuf,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Convert(args) => {
            let request = ConvertRequest {
                height: args.height,
                width: args.width,
                images: args.images,
                out_dir: PathBuf::from("output"),
                output: args.output,
                separate_planes: args.separate_planes,
                to_float: args.to_float,
                px_div: args.px_div,
                px_sub: args.px_sub,
                alignment: args.alignment,
                pitch: args.pitch,
            };
            request.run()?;
            Ok(())
        }
        Command::Speedtest(args) => {
            let config = match args.config {
                Some(path) => DeviceConfig::from_file(&path)?,
                None => DeviceConfig {
                    host: args.camera_ip.ok_or_else(|| missing("--camera-ip"))?,
                    port: args.camera_port,
                    username: args
                        .camera_username
                        .ok_or_else(|| missing("--camera-username"))?,
                    password: args
                        .camera_password
                        .ok_or_else(|| missing("--camera-password"))?,
                },
            };
            let input_size = args.input_size.map(|v| [v[0], v[1], v[2]]);
            let time = SpeedTest::new(config).run(
                &args.model_path,
                args.test_duration,
                args.chip,
                input_size,
            )?;
            println!("{time}");
            if let (Some(readme_path), Some(token)) = (args.readme, args.token) {
                readme::splice_file(&readme_path, &token, &format!("{time:.2}"))?;
                info!("Updated {} token {token}", readme_path.display());
            }
            Ok(())
        }
        Command::ReadmeUpdate(args) => {
            let map = readme::TokenMap::from_file(&args.tokens)?;
            readme::update(&args.readme, &args.log, &map)
        }
        Command::Rename(args) => {
            let copied = rename::strip_numeric_prefixes(&args.images, &args.output)?;
            info!("Copied {copied} files to {}", args.output.display());
            Ok(())
        }
    }
}

fn missing(flag: &str) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("{flag} is required when no --config file is given"),
    )
}

fn positive_u32(s: &str) -> Result<u32, String> {
    let nbr: u32 = s.parse().map_err(|e| format!("{e}"))?;
    if nbr == 0 {
        return Err(format!("{s} is not greater than zero"));
    }
    Ok(nbr)
}

fn non_negative_f32(s: &str) -> Result<f32, String> {
    let nbr: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if nbr < 0.0 {
        return Err(format!("{s} is not non-negative"));
    }
    Ok(nbr)
}
