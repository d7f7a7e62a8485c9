use clap::Parser;
use luma_core::{Frame, SCREEN_HEIGHT, SCREEN_WIDTH};
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Headless driver for the luma emulation core: runs a ROM for a number of
/// frames and optionally dumps the last framebuffer as a PPM image.
#[derive(Parser)]
struct Cli {
    #[arg(short = 'f', long = "rom-file")]
    rom_file: PathBuf,
    #[arg(short = 'n', long = "frames", default_value_t = 600)]
    frames: u32,
    #[arg(long = "dump-frame")]
    dump_frame: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();

    let rom = fs::read(&args.rom_file)?;
    log::info!(
        "starting emulation of {} ({} bytes)",
        args.rom_file.display(),
        rom.len()
    );

    let mut handle = luma_core::start(rom)?;

    // The core paces itself against the wall clock; this loop just samples
    // the framebuffer at roughly the display rate
    let mut last_frame: Option<Frame> = None;
    for _ in 0..args.frames {
        std::thread::sleep(Duration::from_millis(16));
        last_frame = Some(handle.request_frame().wait()?);
    }

    handle.stop();
    handle.join()?;

    if let (Some(path), Some(frame)) = (args.dump_frame, last_frame) {
        write_ppm(&path, &frame)?;
        log::info!("wrote final frame to {}", path.display());
    }

    Ok(())
}

fn write_ppm(path: &PathBuf, frame: &Frame) -> Result<(), std::io::Error> {
    let mut file = fs::File::create(path)?;
    write!(file, "P6\n{SCREEN_WIDTH} {SCREEN_HEIGHT}\n255\n")?;
    file.write_all(frame.as_bytes())?;
    Ok(())
}
