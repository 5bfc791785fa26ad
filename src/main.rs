//! CLI entry point: parse flags, read the configuration, run each
//! artifact's denoiser in sequence, and print the surviving lines.

use denoiser_rs::log::{self, Level};
use denoiser_rs::{Config, Denoiser, Result, WorkerPool};
use std::env;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

struct Options {
    config: Option<String>,
    read_stdin: bool,
    directory: Option<String>,
    no_lines: bool,
    jobs: Option<usize>,
    verbose: bool,
    profile: bool,
    debug: bool,
    help: bool,
}

fn usage(out: &mut dyn Write) {
    let _ = writeln!(out, "Usage: denoiser-rs [OPTIONS]");
    let _ = writeln!(out, "OPTIONS:");
    let _ = writeln!(out, "  -c, --config PATH     read the configuration from PATH");
    let _ = writeln!(out, "      --stdin, -        read the configuration from standard input");
    let _ = writeln!(out, "  -d, --directory PATH  change the working directory before running");
    let _ = writeln!(out, "  -n, --no-lines        omit leading line numbers on output");
    let _ = writeln!(out, "  -j, --jobs N          worker threads per artifact (default: all cores)");
    let _ = writeln!(out, "  -v, --verbose         print progress information to stderr");
    let _ = writeln!(out, "  -p, --profile         print timing information to stderr");
    let _ = writeln!(out, "  -g, --debug           print debugging information to stderr");
    let _ = writeln!(out, "  -h, --help            print this help");
}

fn parse_args(args: &[String]) -> std::result::Result<Options, String> {
    let mut options = Options {
        config: None,
        read_stdin: false,
        directory: None,
        no_lines: false,
        jobs: None,
        verbose: false,
        profile: false,
        debug: false,
        help: false,
    };

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let value = it.next().ok_or("missing value for --config")?;
                options.config = Some(value.clone());
            }
            "--stdin" | "-" => options.read_stdin = true,
            "-d" | "--directory" => {
                let value = it.next().ok_or("missing value for --directory")?;
                options.directory = Some(value.clone());
            }
            "-n" | "--no-lines" => options.no_lines = true,
            "-j" | "--jobs" => {
                let value = it.next().ok_or("missing value for --jobs")?;
                let jobs: usize = value
                    .parse()
                    .map_err(|_| format!("invalid value for --jobs: '{value}'"))?;
                options.jobs = Some(jobs);
            }
            "-v" | "--verbose" => options.verbose = true,
            "-p" | "--profile" => options.profile = true,
            "-g" | "--debug" => options.debug = true,
            "-h" | "--help" => options.help = true,
            other => return Err(format!("unknown argument: '{other}'")),
        }
    }

    if options.read_stdin && options.config.is_some() {
        return Err("cannot specify both --stdin and --config".into());
    }
    if !options.help && !options.read_stdin && options.config.is_none() {
        return Err("either --stdin or --config must be specified".into());
    }
    Ok(options)
}

fn load_config(options: &Options) -> Result<Config> {
    match &options.config {
        Some(path) => Config::load(path),
        None => Config::read(io::stdin().lock()),
    }
}

fn run(options: &Options, config: Config) -> Result<()> {
    if log::enabled(Level::Debug) {
        log::emit(Level::Debug, &format!("{} artifacts:", config.len()));
        for artifact in config.iter() {
            log::emit(
                Level::Debug,
                &format!(" - {} ({})", artifact.alias, artifact.target),
            );
            for reference in &artifact.reference {
                log::emit(Level::Debug, &format!("   - {reference}"));
            }
        }
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    log::profile("all", || -> Result<()> {
        for artifact in config.artifacts {
            let alias = artifact.alias.clone();
            let mut denoiser = Denoiser::new(artifact);
            let mut started = false;
            denoiser.run(&mut |line| {
                if !started {
                    let _ = writeln!(out, "--- begin {} ---", line.source());
                    started = true;
                }
                if options.no_lines {
                    let _ = writeln!(out, "{}", line.text());
                } else {
                    let _ = writeln!(out, "{} {}", line.number(), line.text());
                }
            })?;
            if started {
                let _ = writeln!(out, "--- end {alias} ---");
            }
        }
        Ok(())
    })?;

    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            usage(&mut io::stderr());
            return ExitCode::from(1);
        }
    };

    if options.help {
        usage(&mut io::stdout());
        return ExitCode::SUCCESS;
    }

    if options.verbose {
        log::enable(Level::Info);
    }
    if options.debug {
        log::enable(Level::Debug);
        log::enable(Level::Info);
    }
    if options.profile {
        log::enable(Level::Profile);
    }
    if let Some(jobs) = options.jobs {
        WorkerPool::set_max_threads(jobs);
    }
    if let Some(directory) = &options.directory {
        if let Err(e) = env::set_current_dir(directory) {
            eprintln!("exception got: cannot change directory to '{directory}': {e}");
            return ExitCode::from(1);
        }
    }

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("exception got: {e}");
            return ExitCode::from(1);
        }
    };
    if config.is_empty() {
        eprintln!("exception got: Empty configuration");
        return ExitCode::from(1);
    }

    match run(&options, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("exception got: {e}");
            ExitCode::from(1)
        }
    }
}
