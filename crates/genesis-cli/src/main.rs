use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use genesis_core::{
    codec::{CodecOptions, ImageCodec, DEFAULT_QUALITY, LOSSY_PIXEL_THRESHOLD},
    container::{self, ContainerMetadata},
    transcode::{
        package_video, unique_name, Ffmpeg, Preset, TranscodeParams, Transcoder,
        CONTAINER_EXTENSION, DEFAULT_AUDIO_BITRATE, DEFAULT_CODEC, DEFAULT_CRF,
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Genesis video packaging and adaptive image coding", long_about = None)]
pub struct Cli {
    #[clap(
        long,
        value_enum,
        global = true,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace)"
    )]
    log_level: LogLevel,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
enum Commands {
    #[command(about = "Transcode a video with ffmpeg, optionally packaging it as .genesisvid")]
    Compress(CompressArgs),
    #[command(about = "Recover the MP4 from a .genesisvid container")]
    Reconstruct(ReconstructArgs),
    #[command(about = "Frame any file as a container")]
    Pack(PackArgs),
    #[command(about = "Extract and verify the payload of a container")]
    Unpack(UnpackArgs),
    #[command(
        name = "encode-image",
        about = "Encode an image with the adaptive codec into a container"
    )]
    EncodeImage(EncodeImageArgs),
    #[command(
        name = "decode-image",
        about = "Decode an image container back to a PNG"
    )]
    DecodeImage(DecodeImageArgs),
    #[command(about = "Print container metadata as JSON")]
    Inspect(InspectArgs),
}

#[derive(clap::Args, Clone, Debug)]
struct CompressArgs {
    #[clap(help = "Path to the source video")]
    input: PathBuf,
    #[clap(long, short, help = "Directory for outputs (defaults to the input's directory)")]
    out_dir: Option<PathBuf>,
    #[clap(
        long,
        default_value_t = DEFAULT_CRF,
        value_parser = clap::value_parser!(u8).range(18..=36),
        help = "Constant rate factor, lower is better quality (18-36)"
    )]
    crf: u8,
    #[clap(long, default_value = "medium", help = "Encoder preset, slower gives smaller files")]
    preset: Preset,
    #[clap(long, help = "Target frame rate (0 or absent keeps the source)")]
    fps: Option<u32>,
    #[clap(long, help = "Long-side resolution cap, e.g. 720 (absent keeps the source)")]
    max_resolution: Option<u32>,
    #[clap(long, default_value = DEFAULT_CODEC, help = "Video codec")]
    codec: String,
    #[clap(long, default_value = DEFAULT_AUDIO_BITRATE, help = "Audio bitrate")]
    audio_bitrate: String,
    #[clap(long, help = "Also package the result as .genesisvid")]
    package: bool,
    #[clap(long, default_value = "ffmpeg", help = "Path to the ffmpeg executable")]
    ffmpeg: PathBuf,
    #[clap(long, default_value_t = 3600, help = "Transcode timeout in seconds")]
    timeout_secs: u64,
}

#[derive(clap::Args, Clone, Debug)]
struct ReconstructArgs {
    #[clap(help = "Path to the .genesisvid container")]
    container: PathBuf,
    #[clap(long, short, help = "Output MP4 path (defaults to <stem>_recon.mp4)")]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Clone, Debug)]
struct PackArgs {
    #[clap(help = "File to package")]
    input: PathBuf,
    #[clap(help = "Container path to write")]
    output: PathBuf,
    #[clap(long, help = "Name recorded in metadata (defaults to the input file name)")]
    name: Option<String>,
}

#[derive(clap::Args, Clone, Debug)]
struct UnpackArgs {
    #[clap(help = "Container to unpack")]
    container: PathBuf,
    #[clap(help = "Where to write the payload")]
    output: PathBuf,
}

#[derive(clap::Args, Clone, Debug)]
struct EncodeImageArgs {
    #[clap(help = "Source image (any format the image decoder understands)")]
    input: PathBuf,
    #[clap(help = "Container path to write")]
    output: PathBuf,
    #[clap(
        long,
        default_value_t = DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(1..=100),
        help = "JPEG quality for the lossy pathway"
    )]
    quality: u8,
    #[clap(
        long,
        default_value_t = LOSSY_PIXEL_THRESHOLD,
        help = "Pixel count above which the lossy pathway is used"
    )]
    threshold: u64,
    #[clap(
        long,
        default_value_t = 6,
        value_parser = clap::value_parser!(u32).range(0..=9),
        help = "zlib compression level"
    )]
    level: u32,
}

#[derive(clap::Args, Clone, Debug)]
struct DecodeImageArgs {
    #[clap(help = "Image container to decode")]
    container: PathBuf,
    #[clap(help = "Output image path; format follows the extension")]
    output: PathBuf,
}

#[derive(clap::Args, Clone, Debug)]
struct InspectArgs {
    #[clap(help = "Container to inspect")]
    container: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        let level = args.log_level.as_str();
        EnvFilter::builder().parse_lossy(format!("genesis={level},genesis_core={level}"))
    };
    let _ = tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ))
        .try_init();

    match args.command {
        Commands::Compress(args) => compress(args),
        Commands::Reconstruct(args) => reconstruct(args),
        Commands::Pack(args) => pack(args),
        Commands::Unpack(args) => unpack(args),
        Commands::EncodeImage(args) => encode_image(args),
        Commands::DecodeImage(args) => decode_image(args),
        Commands::Inspect(args) => inspect(args),
    }
}

fn file_stem(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

impl CompressArgs {
    fn params(&self) -> TranscodeParams {
        TranscodeParams {
            codec: self.codec.clone(),
            crf: self.crf,
            preset: self.preset,
            target_fps: self.fps.filter(|&f| f > 0),
            max_resolution: self.max_resolution.filter(|&r| r > 0),
            audio_bitrate: self.audio_bitrate.clone(),
        }
    }
}

fn compress(args: CompressArgs) -> anyhow::Result<()> {
    if !args.input.is_file() {
        bail!("input {} does not exist", args.input.display());
    }
    let params = args.params();
    let stem = file_stem(&args.input)?;
    let out_dir = match &args.out_dir {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let name = |ext: &str| {
        unique_name(
            &stem,
            params.crf,
            params.target_fps,
            params.max_resolution,
            ext,
        )
    };
    let mp4 = out_dir.join(name("mp4"));
    let ffmpeg = Ffmpeg::new(&args.ffmpeg).with_timeout(Duration::from_secs(args.timeout_secs));

    let outcome = if args.package {
        let genesis = out_dir.join(name(CONTAINER_EXTENSION));
        let (outcome, _) = package_video(
            &ffmpeg,
            &args.input,
            &mp4,
            &genesis,
            &file_name(&args.input)?,
            &params,
        )
        .context("packaging video")?;
        println!("{}", genesis.display());
        outcome
    } else {
        ffmpeg
            .transcode(&args.input, &mp4, &params)
            .context("transcoding video")?
    };

    let in_size = fs::metadata(&args.input)?.len();
    let reduction = (1.0 - outcome.output_size as f64 / in_size.max(1) as f64) * 100.0;
    info!(
        "size: {:.2} MB -> {:.2} MB ({reduction:.1}% smaller) in {:.1?}",
        in_size as f64 / 1e6,
        outcome.output_size as f64 / 1e6,
        outcome.elapsed
    );
    println!("{}", mp4.display());
    Ok(())
}

fn reconstruct(args: ReconstructArgs) -> anyhow::Result<()> {
    let output = match args.output {
        Some(output) => output,
        None => args
            .container
            .with_file_name(format!("{}_recon.mp4", file_stem(&args.container)?)),
    };
    let meta = container::unpack_file(&args.container, &output)
        .with_context(|| format!("reconstructing {}", args.container.display()))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    info!(output = %output.display(), "reconstructed");
    Ok(())
}

fn pack(args: PackArgs) -> anyhow::Result<()> {
    let name = match args.name {
        Some(name) => name,
        None => file_name(&args.input)?,
    };
    let meta = container::pack_file(
        &args.input,
        &args.output,
        ContainerMetadata::new(name),
    )
    .with_context(|| format!("packing {}", args.input.display()))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn unpack(args: UnpackArgs) -> anyhow::Result<()> {
    let meta = container::unpack_file(&args.container, &args.output)
        .with_context(|| format!("unpacking {}", args.container.display()))?;
    if !meta.has_digest() {
        warn!("payload written without integrity verification");
    }
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn encode_image(args: EncodeImageArgs) -> anyhow::Result<()> {
    let image = image::open(&args.input)
        .with_context(|| format!("reading image {}", args.input.display()))?;
    let options = CodecOptions::new()
        .with_quality(args.quality)
        .with_threshold(args.threshold)
        .with_compression_level(args.level);

    let encoded = ImageCodec::new(options).encode(&image)?;
    let bytes = container::frame_image(&encoded, file_name(&args.input)?, &options)?;
    fs::write(&args.output, &bytes)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        pathway = %encoded.pathway,
        width = encoded.width,
        height = encoded.height,
        size = bytes.len(),
        "image encoded"
    );
    Ok(())
}

fn decode_image(args: DecodeImageArgs) -> anyhow::Result<()> {
    let bytes = fs::read(&args.container)
        .with_context(|| format!("reading {}", args.container.display()))?;
    let (meta, decoded) = container::decode_image_container(&bytes)?;
    let (width, height) = (decoded.width, decoded.height);
    let rgb = decoded
        .into_rgb_image()
        .context("decoded pixel buffer does not match its dimensions")?;
    rgb.save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        original = %meta.original_filename,
        width,
        height,
        output = %args.output.display(),
        "image decoded"
    );
    Ok(())
}

fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let meta = container::read_metadata(&args.container)
        .with_context(|| format!("inspecting {}", args.container.display()))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_defaults() {
        let cli = Cli::try_parse_from(["genesis", "compress", "clip.mov"]).unwrap();
        let Commands::Compress(args) = cli.command else {
            panic!("expected compress");
        };
        assert_eq!(args.params(), TranscodeParams::default());
        assert!(!args.package);
        assert_eq!(args.timeout_secs, 3600);
    }

    #[test]
    fn test_compress_options() {
        let cli = Cli::try_parse_from([
            "genesis",
            "--log-level",
            "debug",
            "compress",
            "clip.mov",
            "--crf",
            "30",
            "--preset",
            "slow",
            "--fps",
            "0",
            "--max-resolution",
            "720",
            "--package",
        ])
        .unwrap();
        assert!(matches!(cli.log_level, LogLevel::Debug));
        let Commands::Compress(args) = cli.command else {
            panic!("expected compress");
        };
        let params = args.params();
        assert_eq!(params.crf, 30);
        assert_eq!(params.preset, Preset::Slow);
        assert_eq!(params.target_fps, None);
        assert_eq!(params.max_resolution, Some(720));
        assert!(args.package);
    }

    #[test]
    fn test_crf_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["genesis", "compress", "a.mov", "--crf", "40"]).is_err());
        assert!(Cli::try_parse_from(["genesis", "compress", "a.mov", "--preset", "warp"]).is_err());
    }

    #[test]
    fn test_encode_image_defaults() {
        let cli = Cli::try_parse_from(["genesis", "encode-image", "in.png", "out.gen"]).unwrap();
        let Commands::EncodeImage(args) = cli.command else {
            panic!("expected encode-image");
        };
        assert_eq!(args.quality, 90);
        assert_eq!(args.threshold, 1_000_000);
        assert_eq!(args.level, 6);
    }

    #[test]
    fn test_pack_unpack_inspect_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        let packed = dir.path().join("notes.genesisvid");
        let restored = dir.path().join("notes.out");
        fs::write(&input, b"field notes").unwrap();

        pack(PackArgs {
            input: input.clone(),
            output: packed.clone(),
            name: None,
        })
        .unwrap();
        inspect(InspectArgs {
            container: packed.clone(),
        })
        .unwrap();
        unpack(UnpackArgs {
            container: packed,
            output: restored.clone(),
        })
        .unwrap();
        assert_eq!(fs::read(restored).unwrap(), b"field notes");
    }

    #[test]
    fn test_reconstruct_default_output_name() {
        let dir = tempfile::tempdir().unwrap();
        let mp4 = dir.path().join("clip.mp4");
        let packed = dir.path().join("clip_crf28_fpsSRC_rSRC.genesisvid");
        fs::write(&mp4, b"mp4 bytes").unwrap();
        container::pack_file(&mp4, &packed, ContainerMetadata::new("clip.mov")).unwrap();

        reconstruct(ReconstructArgs {
            container: packed,
            output: None,
        })
        .unwrap();
        let recon = dir.path().join("clip_crf28_fpsSRC_rSRC_recon.mp4");
        assert_eq!(fs::read(recon).unwrap(), b"mp4 bytes");
    }

    #[test]
    fn test_image_commands_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dots.png");
        let packed = dir.path().join("dots.gen");
        let out = dir.path().join("dots_out.png");
        let img =
            image::RgbImage::from_fn(9, 7, |x, y| image::Rgb([(x * 20) as u8, (y * 30) as u8, 5]));
        img.save(&src).unwrap();

        encode_image(EncodeImageArgs {
            input: src,
            output: packed.clone(),
            quality: 90,
            threshold: LOSSY_PIXEL_THRESHOLD,
            level: 6,
        })
        .unwrap();
        decode_image(DecodeImageArgs {
            container: packed,
            output: out.clone(),
        })
        .unwrap();
        let back = image::open(out).unwrap().to_rgb8();
        assert_eq!(back, img);
    }

    #[test]
    fn test_compress_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mov");
        let cli = Cli::try_parse_from(["genesis", "compress", missing.to_str().unwrap()]).unwrap();
        let Commands::Compress(args) = cli.command else {
            panic!("expected compress");
        };
        assert!(compress(args).is_err());
    }
}
