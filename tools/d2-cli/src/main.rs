use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use common::Palette;
use dc6::error::SinkError;
use dc6::{DecodedImage, Dc6Reader, ImageSink};
use dt1::{Dt1, TileLayout};
use miette::{IntoDiagnostic, Result, WrapErr};

#[derive(Parser, Debug)]
#[command(name = "D2 CLI")]
#[command(about, author, version, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides it
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode every frame of "DC6" sprites into PNG files
    #[command(arg_required_else_help = true)]
    Dc6 {
        /// "DC6" files, or directories searched recursively
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Palette file of RGB triples
        #[arg(short, long, value_name = "FILE")]
        palette: PathBuf,
        /// Outbound directory
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
        /// Overwrite files
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
    /// Print the header and frame headers of a "DC6" file
    #[command(arg_required_else_help = true)]
    Info {
        /// "DC6" file
        file: PathBuf,
    },
    /// Print the tiles of a "DT1" file
    #[command(arg_required_else_help = true)]
    Dt1 {
        /// "DT1" file
        file: PathBuf,
        /// Read 72-byte tile records without blocks
        #[arg(long, default_value_t = false)]
        legacy: bool,
        /// Write the parsed structure as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    let stdout = console::Term::stdout();

    match cli.command {
        Commands::Dc6 {
            inputs,
            palette,
            out,
            force,
        } => command_dc6(&stdout, &inputs, &palette, &out, force)?,
        Commands::Info { file } => command_info(&stdout, &file)?,
        Commands::Dt1 { file, legacy, json } => {
            command_dt1(&stdout, &file, legacy, json.as_deref())?
        }
    }

    Ok(())
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

type ConfirmOverwrite = Box<dyn FnMut(&Path) -> core::result::Result<bool, SinkError>>;

/// Writes each emitted frame to `<out>/<destination>.png`.
struct PngSink {
    out: PathBuf,
    force: bool,
    confirm: ConfirmOverwrite,
    written: usize,
    skipped: usize,
}

impl PngSink {
    fn new(out: impl Into<PathBuf>, force: bool, confirm: ConfirmOverwrite) -> Self {
        Self {
            out: out.into(),
            force,
            confirm,
            written: 0,
            skipped: 0,
        }
    }

    fn path_for(&self, destination: &str) -> PathBuf {
        self.out.join(format!("{destination}.png"))
    }
}

impl ImageSink for PngSink {
    fn emit(
        &mut self,
        destination: &str,
        frame: DecodedImage,
    ) -> core::result::Result<(), SinkError> {
        let path = self.path_for(destination);
        if !self.force && path.exists() && !(self.confirm)(&path)? {
            log::info!("keeping existing {}", path.display());
            self.skipped += 1;
            return Ok(());
        }

        let DecodedImage {
            width,
            height,
            rgba8,
        } = frame;
        let buffer = image::RgbaImage::from_raw(width, height, rgba8)
            .ok_or_else(|| format!("pixel buffer does not match {width}x{height}"))?;
        buffer.save_with_format(&path, image::ImageFormat::Png)?;
        log::trace!("wrote {}", path.display());
        self.written += 1;
        Ok(())
    }
}

fn ask_overwrite(path: &Path) -> core::result::Result<bool, SinkError> {
    let message = format!("File \"{}\" exists. Overwrite it?", path.display());
    Ok(dialoguer::Confirm::new().with_prompt(message).interact()?)
}

fn command_dc6(
    stdout: &console::Term,
    inputs: &[PathBuf],
    palette: &Path,
    out: &Path,
    force: bool,
) -> Result<()> {
    let palette = Palette::open_path(palette)
        .wrap_err_with(|| format!("failed to load palette {}", palette.display()))?;
    std::fs::create_dir_all(out).into_diagnostic()?;

    let files = common::files_with_extension(inputs, "dc6");
    if files.is_empty() {
        log::warn!("no .dc6 files found");
    }

    let bar = indicatif::ProgressBar::new(files.len() as u64);
    bar.set_style(get_bar_style()?);

    let prompt_bar = bar.clone();
    let mut sink = PngSink::new(
        out,
        force,
        Box::new(move |path: &Path| prompt_bar.suspend(|| ask_overwrite(path))),
    );

    let mut frames = 0usize;
    let mut failed = 0usize;
    for path in &files {
        bar.set_message(path.display().to_string());
        match extract_file(path, &palette, &mut sink) {
            Ok(count) => frames += count,
            Err(report) => {
                failed += 1;
                bar.suspend(|| log::error!("{report:?}"));
            }
        }
        bar.inc(1);
    }
    bar.finish();

    let text = format!(
        "Files: {};\nFailed: {};\nFrames: {};\nWritten: {};\nSkipped: {};",
        files.len(),
        failed,
        frames,
        sink.written,
        sink.skipped
    );
    stdout.write_line(&text).into_diagnostic()?;

    if failed > 0 {
        miette::bail!("{failed} of {} files failed to decode", files.len());
    }

    Ok(())
}

fn extract_file(path: &Path, palette: &Palette, sink: &mut PngSink) -> Result<usize> {
    let mut reader = open_dc6(path)?;
    let stem = path.file_stem().map_or_else(
        || "frame".to_string(),
        |stem| stem.to_string_lossy().into_owned(),
    );
    reader
        .extract_frames(palette, sink, &stem)
        .wrap_err_with(|| format!("failed to extract frames from {}", path.display()))
}

fn open_dc6(path: &Path) -> Result<Dc6Reader<BufReader<File>>> {
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to open {}", path.display()))?;
    Dc6Reader::open(BufReader::new(file))
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn command_info(stdout: &console::Term, file: &Path) -> Result<()> {
    let mut reader = open_dc6(file)?;

    let text = format!("Header: {:#?};", reader.header());
    stdout.write_line(&text).into_diagnostic()?;

    for index in 0..reader.frame_count() {
        let offset = reader.offsets()[index];
        let frame = reader
            .read_frame_header(index)
            .wrap_err_with(|| format!("failed to read frame {index} of {}", file.display()))?;
        let text = format!(
            "Frame: {index};\nOffset: {offset};\nSize: {}x{};\nOrigin: ({}, {});\nFlipped: {};\nLength: {} (bytes);",
            frame.width, frame.height, frame.origin_x, frame.origin_y, frame.flipped, frame.length
        );
        stdout.write_line(&text).into_diagnostic()?;
    }

    Ok(())
}

fn command_dt1(
    stdout: &console::Term,
    file: &Path,
    legacy: bool,
    json: Option<&Path>,
) -> Result<()> {
    let layout = if legacy {
        TileLayout::Legacy
    } else {
        TileLayout::Current
    };
    let source = File::open(file)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to open {}", file.display()))?;
    let dt1 = Dt1::open_with(BufReader::new(source), layout)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;

    for (index, tile) in dt1.tiles.iter().enumerate() {
        let text = format!(
            "Tile: {index};\nSize: {}x{};\nType: {}; Style: {}; Sequence: {}; Rarity: {};\nBlocks: {};",
            tile.width,
            tile.height,
            tile.tile_type,
            tile.style,
            tile.sequence,
            tile.rarity,
            tile.blocks.len()
        );
        stdout.write_line(&text).into_diagnostic()?;
    }

    let text = format!(
        "Version: {}.{};\nTotal tiles: {};\nTotal blocks: {};",
        dt1.header.major_version,
        dt1.header.minor_version,
        dt1.tiles.len(),
        dt1.block_count()
    );
    stdout.write_line(&text).into_diagnostic()?;

    if let Some(json) = json {
        write_json(json, &dt1)?;
    }

    Ok(())
}

fn write_json(path: &Path, dt1: &Dt1) -> Result<()> {
    let file = File::create(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dt1).into_diagnostic()?;
    writer.flush().into_diagnostic()?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn get_bar_style() -> Result<indicatif::ProgressStyle> {
    Ok(
        indicatif::ProgressStyle::with_template("[{bar:32}] {pos:>7}/{len:7} {msg}")
            .into_diagnostic()?
            .progress_chars("=>-"),
    )
}
