use crate::fraction::{FractionModel, DEFAULT_BIN_WIDTH, DEFAULT_MAX_LENGTH};
use crate::utils::{GenomicRegion, Result};
use chrono::Datelike;
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    format!(
        "{}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    )
});

#[derive(Parser)]
#[command(name="fetalcall",
          version=&**FULL_VERSION,
          about="Fetal genotype calling from maternal cell-free DNA",
          long_about = None,
          disable_help_subcommand = true,
          after_help = format!("Copyright (C) 2019-{}
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()),
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = ArgAction::Count, help = "Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)")]
    pub verbosity: u8,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Build a fragment observation store from a caller trace")]
    Build(BuildArgs),
    #[clap(about = "Estimate the fetal fraction by fragment length")]
    Fraction(FractionArgs),
    #[clap(about = "Call fetal genotypes")]
    Call(CallArgs),
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("build")))]
#[command(arg_required_else_help(true))]
pub struct BuildArgs {
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "trace")]
    #[clap(help = "Per-fragment debug trace of the variant caller (plain or gzipped, - for stdin)")]
    #[clap(value_name = "TRACE")]
    #[arg(value_parser = check_input_or_stdin)]
    pub trace_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(help = "Indexed BAM file with the aligned cfDNA reads")]
    #[clap(value_name = "READS")]
    #[arg(value_parser = check_file_exists)]
    pub reads_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 's')]
    #[clap(long = "store")]
    #[clap(help = "Root directory of the observation store")]
    #[clap(value_name = "STORE")]
    #[arg(value_parser = check_prefix_path)]
    pub store_root: String,

    #[clap(long = "shard")]
    #[clap(value_name = "SHARD")]
    #[clap(help = "Name of the shard to build")]
    #[clap(default_value = "all")]
    #[arg(value_parser = check_shard_name)]
    pub shard: String,

    #[clap(short = 'p')]
    #[clap(long = "parents")]
    #[clap(help = "Indexed parental VCF/BCF used to tag fraction-informative fragments")]
    #[clap(value_name = "PARENTS")]
    #[arg(value_parser = check_file_exists)]
    pub parents_path: Option<PathBuf>,

    #[clap(long = "mother")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help = "Maternal sample in the parental VCF [default: first sample]")]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub mother: Option<String>,

    #[clap(long = "father")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help = "Paternal sample in the parental VCF [default: second sample]")]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub father: Option<String>,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "window")]
    #[clap(value_name = "BP")]
    #[clap(help = "Half-width of the alignment window loaded around each position")]
    #[clap(default_value = "1000")]
    pub window: u32,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "overwrite")]
    #[clap(help = "Replace an existing shard")]
    pub overwrite: bool,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("fraction")))]
#[command(arg_required_else_help(true))]
pub struct FractionArgs {
    #[clap(required = true)]
    #[clap(short = 's')]
    #[clap(long = "store")]
    #[clap(help = "Root directory of the observation store")]
    #[clap(value_name = "STORE")]
    #[arg(value_parser = check_file_exists)]
    pub store_root: PathBuf,

    #[clap(long = "shard")]
    #[clap(value_name = "SHARD")]
    #[clap(help = "Restrict to one shard [default: every shard]")]
    #[arg(value_parser = check_shard_name)]
    pub shard: Option<String>,

    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(help = "Output TSV [default: stdout]")]
    #[clap(value_name = "TSV")]
    #[arg(value_parser = check_prefix_path)]
    pub output: Option<String>,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads [default: available cores]")]
    #[clap(value_name = "THREADS")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: Option<usize>,

    #[command(flatten)]
    pub model: FractionModelArgs,
}

/// Options shared by every command that builds the fraction model.
#[derive(Args, Debug, Clone)]
pub struct FractionModelArgs {
    #[clap(help_heading("Fraction model"))]
    #[clap(long = "bin-width")]
    #[clap(value_name = "BP")]
    #[clap(help = "Fragment length bin width")]
    #[clap(default_value_t = DEFAULT_BIN_WIDTH)]
    #[arg(value_parser = positive_length)]
    pub bin_width: u32,

    #[clap(help_heading("Fraction model"))]
    #[clap(long = "max-length")]
    #[clap(value_name = "BP")]
    #[clap(help = "Upper bound of the binned length domain")]
    #[clap(default_value_t = DEFAULT_MAX_LENGTH)]
    #[arg(value_parser = positive_length)]
    pub max_length: u32,

    #[clap(help_heading("Fraction model"))]
    #[clap(long = "fetal-fraction")]
    #[clap(value_name = "FRACTION")]
    #[clap(help = "Override the estimated total fetal fraction")]
    #[arg(value_parser = ensure_unit_float)]
    pub fetal_fraction: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("call")))]
#[command(arg_required_else_help(true))]
pub struct CallArgs {
    #[clap(required = true)]
    #[clap(short = 'c')]
    #[clap(long = "cfdna")]
    #[clap(help = "Position-sorted cfDNA VCF/BCF")]
    #[clap(value_name = "VCF")]
    #[arg(value_parser = check_file_exists)]
    pub cfdna_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'p')]
    #[clap(long = "parents")]
    #[clap(help = "Position-sorted parental VCF/BCF")]
    #[clap(value_name = "VCF")]
    #[arg(value_parser = check_file_exists)]
    pub parents_path: PathBuf,

    #[clap(long = "cfdna-sample")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help = "cfDNA sample whose FORMAT fields fill the fetal column [default: first]")]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub cfdna_sample: Option<String>,

    #[clap(long = "mother")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help = "Maternal sample in the parental VCF [default: first sample]")]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub mother: Option<String>,

    #[clap(long = "father")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help = "Paternal sample in the parental VCF [default: second sample]")]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub father: Option<String>,

    #[clap(required = true)]
    #[clap(short = 's')]
    #[clap(long = "store")]
    #[clap(help = "Root directory of the observation store")]
    #[clap(value_name = "STORE")]
    #[arg(value_parser = check_file_exists)]
    pub store_root: PathBuf,

    #[clap(long = "shard")]
    #[clap(value_name = "SHARD")]
    #[clap(help = "Restrict to one shard [default: every shard]")]
    #[arg(value_parser = check_shard_name)]
    pub shard: Option<String>,

    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(help = "Output VCF/BCF, type inferred from the extension [default: stdout]")]
    #[clap(value_name = "VCF")]
    #[arg(value_parser = check_prefix_path)]
    pub output: Option<String>,

    #[clap(long = "sample-name")]
    #[clap(value_name = "SAMPLE_NAME")]
    #[clap(help = "Name of the fetal sample in the output")]
    #[clap(default_value = "FETUS")]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub sample_name: String,

    #[clap(long = "region")]
    #[clap(value_name = "REGION")]
    #[clap(help = "Only call sites in this region (requires indexed inputs)")]
    #[arg(value_parser = GenomicRegion::from_string)]
    pub region: Option<GenomicRegion>,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads [default: available cores]")]
    #[clap(value_name = "THREADS")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: Option<usize>,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "model")]
    #[clap(value_name = "MODEL")]
    #[clap(help = "Per-fragment fetal fraction model (uniform, lengths or origin)")]
    #[clap(default_value = "lengths")]
    pub model: FractionModel,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "origin-fraction")]
    #[clap(value_name = "FRACTION")]
    #[clap(help = "Fetal fraction assigned to known fetal fragments by the origin model")]
    #[clap(default_value = "0.7")]
    #[arg(value_parser = ensure_unit_float)]
    pub origin_fraction: f64,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "fetal-reads")]
    #[clap(value_name = "FILE")]
    #[clap(help = "Read names known to be fetal, one per line (origin model)")]
    #[arg(value_parser = check_file_exists)]
    pub fetal_reads: Option<PathBuf>,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "max-fragments")]
    #[clap(value_name = "N")]
    #[clap(help = "Use at most N fragments per position")]
    pub max_fragments: Option<usize>,

    #[command(flatten)]
    pub fraction: FractionModelArgs,
}

pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn check_prefix_path(s: &str) -> Result<String> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(format!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(s.to_string())
}

fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid thread number", s))?;
    if thread >= 1 {
        Ok(thread)
    } else {
        Err("Number of threads must be at least 1".into())
    }
}

fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        Err(format!("File does not exist: {}", path.display()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn check_input_or_stdin(s: &str) -> Result<PathBuf> {
    if s == "-" {
        Ok(PathBuf::from(s))
    } else {
        check_file_exists(s)
    }
}

fn check_sample_name_nonempty(s: &str) -> Result<String> {
    if s.trim().is_empty() {
        Err("Sample name cannot be an empty string".to_string())
    } else {
        Ok(s.to_string())
    }
}

fn check_shard_name(s: &str) -> Result<String> {
    if s.is_empty() || s.starts_with('.') || s.contains(['/', '\\']) {
        Err(format!("Invalid shard name: `{}`", s))
    } else {
        Ok(s.to_string())
    }
}

fn ensure_unit_float(s: &str) -> Result<f64> {
    let value = s
        .parse::<f64>()
        .map_err(|e| format!("Could not parse float: {}", e))?;
    if !(0.0..=1.0).contains(&value) {
        Err(format!(
            "The value must be between 0.0 and 1.0, got: {}",
            value
        ))
    } else {
        Ok(value)
    }
}

fn positive_length(s: &str) -> Result<u32> {
    match s.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(format!("`{}` is not a positive length", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn validators_reject_bad_values() {
        assert!(ensure_unit_float("1.5").is_err());
        assert_eq!(ensure_unit_float("0.25"), Ok(0.25));
        assert!(threads_in_range("0").is_err());
        assert!(positive_length("0").is_err());
        assert_eq!(positive_length("3"), Ok(3));
        assert!(check_shard_name("../escape").is_err());
        assert!(check_shard_name(".hidden").is_err());
        assert_eq!(check_shard_name("chr1"), Ok("chr1".to_string()));
        assert_eq!(check_input_or_stdin("-"), Ok(PathBuf::from("-")));
        assert!(check_input_or_stdin("/nonexistent/trace.txt").is_err());
    }

    #[test]
    fn call_defaults() {
        let cli = Cli::try_parse_from([
            "fetalcall",
            "call",
            "--cfdna",
            "/",
            "--parents",
            "/",
            "--store",
            "/",
        ])
        .unwrap();
        let Command::Call(args) = cli.command else {
            panic!("expected the call subcommand");
        };
        assert_eq!(args.model, FractionModel::Lengths);
        assert_eq!(args.sample_name, "FETUS");
        assert_eq!(args.origin_fraction, 0.7);
        assert_eq!(args.fraction.bin_width, DEFAULT_BIN_WIDTH);
        assert_eq!(args.fraction.max_length, DEFAULT_MAX_LENGTH);
        assert_eq!(args.fraction.fetal_fraction, None);
        assert_eq!(args.max_fragments, None);
    }
}
