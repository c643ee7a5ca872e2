extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate mandel;
extern crate num_cpus;

use clap::{App, Arg, ArgMatches};
use mandel::{Backend, ImageFormat, RenderConfig, RenderError, Strategy};
use std::path::Path;
use std::str::FromStr;

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const SIZE: &str = "size";
const ORIGIN: &str = "origin";
const RANGE: &str = "range";
const ITERATIONS: &str = "iterations";
const MAXLOOP: &str = "max-loop";
const STRATEGY: &str = "strategy";
const WORKGROUP: &str = "workgroup-size";
const BACKEND: &str = "backend";
const THREADS: &str = "threads";
const KERNEL: &str = "kernel";
const FORMAT: &str = "format";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("mandel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Escape-time Mandelbrot renderer with GPU offload")
        .arg(
            Arg::with_name(OUTPUT)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .default_value("mandel.ppm")
                .help("Output file, overwritten if it exists"),
        )
        .arg(
            Arg::with_name(SIZE)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("800x600")
                .validator(|s| validate_pair::<usize>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image"),
        )
        .arg(
            Arg::with_name(ORIGIN)
                .long(ORIGIN)
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("-2.5,-1.5")
                .validator(|s| validate_pair::<f32>(&s, ',', "Could not parse plane origin"))
                .help("Point of the complex plane sampled by the first pixel"),
        )
        .arg(
            Arg::with_name(RANGE)
                .long(RANGE)
                .takes_value(true)
                .default_value("4.0,3.0")
                .validator(|s| validate_pair::<f32>(&s, ',', "Could not parse plane range"))
                .help("Width and height of the sampled region of the complex plane"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value("256")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        u32::max_value(),
                        "Could not parse iteration count",
                        "Iteration count must be at least 1",
                    )
                })
                .help("Iteration budget per point"),
        )
        .arg(
            Arg::with_name(MAXLOOP)
                .long(MAXLOOP)
                .short("m")
                .takes_value(true)
                .default_value("64")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        u32::max_value(),
                        "Could not parse per-launch iteration cap",
                        "Per-launch iteration cap must be at least 1",
                    )
                })
                .help("Iterations per launch for the resumable strategy"),
        )
        .arg(
            Arg::with_name(STRATEGY)
                .long(STRATEGY)
                .takes_value(true)
                .possible_values(&["single", "resumable"])
                .default_value("resumable")
                .help("Run every point in one launch, or in bounded resumable launches"),
        )
        .arg(
            Arg::with_name(WORKGROUP)
                .long(WORKGROUP)
                .short("w")
                .takes_value(true)
                .default_value("64")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1024,
                        "Could not parse work-group size",
                        "Work-group size must be between 1 and 1024",
                    )
                })
                .help("Invocations per work group on the device"),
        )
        .arg(
            Arg::with_name(BACKEND)
                .long(BACKEND)
                .short("b")
                .takes_value(true)
                .possible_values(&["gpu", "host"])
                .default_value("gpu")
                .help("Evaluate on the GPU or on host threads"),
        )
        .arg(
            Arg::with_name(THREADS)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of threads for the host backend (default: all CPUs)"),
        )
        .arg(
            Arg::with_name(KERNEL)
                .long(KERNEL)
                .short("k")
                .takes_value(true)
                .help("Kernel source to compile instead of the default for the strategy"),
        )
        .arg(
            Arg::with_name(FORMAT)
                .long(FORMAT)
                .short("f")
                .takes_value(true)
                .possible_values(&["ppm", "pgm"])
                .default_value("ppm")
                .help("Plain-text RGB pixmap or binary graymap"),
        )
        .get_matches()
}

fn config(matches: &ArgMatches) -> RenderConfig {
    let (width, height) =
        parse_pair(matches.value_of(SIZE).unwrap(), 'x').expect("Error parsing image dimensions");
    let (x_min, y_min) =
        parse_pair(matches.value_of(ORIGIN).unwrap(), ',').expect("Error parsing plane origin");
    let (x_range, y_range) =
        parse_pair(matches.value_of(RANGE).unwrap(), ',').expect("Error parsing plane range");
    let max_iter = u32::from_str(matches.value_of(ITERATIONS).unwrap())
        .expect("Could not parse iteration count.");
    let max_loop = u32::from_str(matches.value_of(MAXLOOP).unwrap())
        .expect("Could not parse per-launch iteration cap.");
    let workgroup_size = u32::from_str(matches.value_of(WORKGROUP).unwrap())
        .expect("Could not parse work-group size.");

    let strategy = match matches.value_of(STRATEGY) {
        Some("single") => Strategy::SingleShot,
        _ => Strategy::Resumable { max_loop },
    };
    let backend = match matches.value_of(BACKEND) {
        Some("host") => Backend::Host {
            threads: matches
                .value_of(THREADS)
                .map(|t| usize::from_str(t).expect("Could not parse thread count."))
                .unwrap_or_else(num_cpus::get),
        },
        _ => Backend::Gpu,
    };

    RenderConfig {
        width,
        height,
        x_min,
        y_min,
        x_range,
        y_range,
        max_iter,
        strategy,
        workgroup_size,
        backend,
    }
}

fn run(matches: &ArgMatches) -> Result<(), RenderError> {
    let config = config(matches);
    config.validate()?;
    let format = ImageFormat::from_str(matches.value_of(FORMAT).unwrap())
        .map_err(RenderError::Config)?;

    let kernel = matches.value_of(KERNEL).map(Path::new);
    let mut dispatcher = mandel::open_dispatcher(&config, kernel)?;
    let grid = mandel::render(&config, dispatcher.as_mut())?;
    // Release the device before writing the image.
    drop(dispatcher);

    let output = Path::new(matches.value_of(OUTPUT).unwrap());
    mandel::ppm::save(output, &grid, format)?;
    info!("wrote {}", output.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let matches = args();
    if let Err(e) = run(&matches) {
        if let RenderError::KernelBuild { ref log } = e {
            eprintln!("Build log: \n{}", log);
        }
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
