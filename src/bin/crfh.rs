//! Usage:
//! ./crfh SPEC INPUT_IMAGE OUTPUT_FILE [MIN_HIST_VALUE] [SKIP_BORDER_PIXELS]
//!
//! Writes the normalized histogram of INPUT_IMAGE as `index:value` pairs to OUTPUT_FILE.

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;
use std::process::exit;

use crfh::{HistogramOptions, System};

const USAGE: &str = "Usage: crfh SPEC INPUT_IMAGE OUTPUT_FILE [MIN_HIST_VALUE] [SKIP_BORDER_PIXELS]
  SPEC                descriptors, e.g. Lxx(8,28)+Lxy(8,28)+Lyy(8,28)
  MIN_HIST_VALUE      drop bins below this fraction of the total (default 0)
  SKIP_BORDER_PIXELS  ignore pixels this close to the border (default 0)";

fn run(
    spec: &str,
    input: &Path,
    output: &Path,
    options: &HistogramOptions,
) -> Result<(), Box<dyn Error>> {
    let system = System::new(spec)?;
    let img = image::open(input)?;
    log::info!(
        "computing {} for {} ({}x{})",
        system.spec(),
        input.display(),
        img.width(),
        img.height()
    );
    let hist = system.process(&img, options)?;
    log::info!("{} non-empty bins", hist.len());

    let mut out = BufWriter::new(File::create(output)?);
    hist.serialize(&mut out)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if !(4..=6).contains(&args.len()) {
        eprintln!("{USAGE}");
        exit(1);
    }
    let mut options = HistogramOptions::default();
    if let Some(arg) = args.get(4) {
        options.min_hist_value = match arg.parse() {
            Ok(v) => v,
            Err(_) => {
                eprintln!("invalid MIN_HIST_VALUE '{arg}'\n{USAGE}");
                exit(1);
            }
        };
    }
    if let Some(arg) = args.get(5) {
        options.skip_border_pixels = match arg.parse() {
            Ok(v) => v,
            Err(_) => {
                eprintln!("invalid SKIP_BORDER_PIXELS '{arg}'\n{USAGE}");
                exit(1);
            }
        };
    }

    if let Err(err) = run(&args[1], Path::new(&args[2]), Path::new(&args[3]), &options) {
        eprintln!("Error: {err}");
        exit(1);
    }
}
