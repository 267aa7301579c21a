use std::fs;
use std::path::Path;

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::str::contains;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("larodkit").unwrap()
}

struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        fs::create_dir_all(tmp.path().join("images")).expect("create images dir");
        fs::create_dir_all(tmp.path().join("output")).expect("create output dir");
        Self { tmp }
    }

    fn path(&self) -> &Path {
        self.tmp.path()
    }

    fn add_image(&self, name: &str, side: u32, px: [u8; 3]) {
        RgbImage::from_pixel(side, side, Rgb(px))
            .save(self.path().join("images").join(name))
            .expect("write fixture image");
    }

    fn convert(&self, extra: &[&str]) -> assert_cmd::assert::Assert {
        let mut c = cmd();
        c.current_dir(self.path());
        c.args(["convert", "2", "2", "images"]);
        c.args(extra);
        c.assert()
    }

    fn outputs(&self) -> usize {
        fs::read_dir(self.path().join("output")).unwrap().count()
    }
}

#[test]
fn convert_writes_packed_rgb_bytes() {
    let fx = Fixture::new();
    fx.add_image("car.png", 4, [10, 20, 30]);
    fx.convert(&[]).success();
    let out = fs::read(fx.path().join("output/car.bin")).expect("read output");
    assert_eq!(out.len(), 2 * 2 * 3);
    assert_eq!(out, [10, 20, 30].repeat(4));
}

#[test]
fn convert_float_output_is_four_bytes_per_component() {
    let fx = Fixture::new();
    fx.add_image("car.png", 4, [100, 100, 100]);
    fx.convert(&["-f", "-m", "50", "-s", "2"]).success();
    let out = fs::read(fx.path().join("output/car.bin")).expect("read output");
    assert_eq!(out.len(), 2 * 2 * 3 * 4);
    // Subtraction before division: (100 - 50) / 2.
    assert_eq!(out[..4], 25.0f32.to_ne_bytes());
}

#[test]
fn convert_rejects_alignment_combined_with_pitch() {
    let fx = Fixture::new();
    fx.add_image("car.png", 4, [1, 2, 3]);
    fx.convert(&["-a", "4", "-w", "16"])
        .failure()
        .stderr(contains("alignment and pitch"));
    assert_eq!(fx.outputs(), 0);
}

#[test]
fn convert_rejects_float_options_without_float_mode() {
    let fx = Fixture::new();
    fx.add_image("car.png", 4, [1, 2, 3]);
    fx.convert(&["-s", "255"])
        .failure()
        .stderr(contains("--float"));
    assert_eq!(fx.outputs(), 0);
}

#[test]
fn convert_skips_files_it_cannot_decode() {
    let fx = Fixture::new();
    fx.add_image("1.png", 4, [1, 2, 3]);
    fx.add_image("2.png", 4, [4, 5, 6]);
    fs::write(fx.path().join("images/broken.jpg"), b"not an image").unwrap();

    fx.convert(&[]).success().stderr(contains("broken.jpg"));
    assert_eq!(fx.outputs(), 2);
}

#[test]
fn convert_zero_dimension_fails_at_parse_time() {
    cmd()
        .args(["convert", "0", "2", "images"])
        .assert()
        .failure()
        .stderr(contains("not greater than zero"));
}

#[test]
fn rename_strips_numeric_prefixes() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("in")).unwrap();
    fs::write(tmp.path().join("in/img_000123.jpg"), b"x").unwrap();
    cmd()
        .current_dir(tmp.path())
        .args(["rename", "in", "out"])
        .assert()
        .success();
    assert!(tmp.path().join("out/123.jpg").exists());
}

#[test]
fn readme_update_splices_measured_times() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("README.md"),
        "| MobileNet v2 | <!--A8_tf1_mnv2--> 100.00 ms <!--end_A8_tf1_mnv2--> |",
    )
    .unwrap();
    fs::write(
        tmp.path().join("larod_out.txt"),
        "result: ./models/artpec8/mobilenet_v2_1.0_224_quant.tflite \
         2023-02-07T10:57:31.086 Mean execution time for job: 9.44 ms",
    )
    .unwrap();
    fs::write(
        tmp.path().join("tokens.toml"),
        "[tokens]\n\"/artpec8/mobilenet_v2_1.0_224_quant.tflite\" = \"A8_tf1_mnv2\"\n",
    )
    .unwrap();

    cmd()
        .current_dir(tmp.path())
        .args(["readme-update", "--log", "larod_out.txt", "--tokens", "tokens.toml"])
        .assert()
        .success();

    let readme = fs::read_to_string(tmp.path().join("README.md")).unwrap();
    assert!(readme.contains("<!--A8_tf1_mnv2--> 9.44 ms <!--end_A8_tf1_mnv2-->"));
}

#[test]
fn speedtest_requires_connection_settings() {
    cmd()
        .args(["speedtest", "--model-path", "model.tflite"])
        .assert()
        .failure()
        .stderr(contains("--camera-ip"));
}
