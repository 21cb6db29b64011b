mod debug_report;

use seqex::{ComparatorChain, CompiledPattern, FindType, MatchOptions, MultiPatternMatcher, compile, tokens_from_str};
use std::io::{self, IsTerminal, Read};

fn main() {
    init_tracing();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// Install a subscriber only when `RUST_LOG` is set, e.g. `RUST_LOG=seqex=trace`.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true).with_level(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn run(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = tokens_from_str(&config.input);
    let patterns = config
        .patterns
        .iter()
        .map(|source| compile(source).map_err(|err| format!("pattern `{source}`: {err}")))
        .collect::<Result<Vec<CompiledPattern>, _>>()?;

    let palette = debug_report::Palette::new(config.color);
    debug_report::print_header(&tokens, &palette);

    if let [pattern] = patterns.as_slice() {
        let mut matcher = pattern.matcher(&tokens).with_options(config.options.clone());
        let found = matcher.find_all().collect::<Result<Vec<_>, _>>()?;
        debug_report::print_matches(pattern.source(), &found, &palette);
        debug_report::print_search_metrics(matcher.metrics(), &palette);
    } else {
        let multi = MultiPatternMatcher::new(patterns).with_options(config.options.clone());
        let run = multi.run(&tokens, &ComparatorChain::default())?;
        debug_report::print_multi(multi.patterns(), &run, &palette);
    }
    println!();
    Ok(())
}

struct CliConfig {
    patterns: Vec<String>,
    input: String,
    options: MatchOptions,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut patterns = Vec::new();
    let mut input: Option<String> = None;
    let mut options = MatchOptions::default();
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("seqex {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--all" => options.find_type = FindType::All,
            "-p" | "--pattern" => {
                let value = args.next().ok_or_else(|| format!("error: {arg} expects a value"))?;
                patterns.push(value);
            }
            "--max-steps" => {
                let value = args.next().ok_or_else(|| "error: --max-steps expects a value".to_string())?;
                options.max_steps = Some(parse_steps(&value)?);
            }
            "--" => {
                input = Some(args.by_ref().collect::<Vec<_>>().join(" "));
                break;
            }
            _ if arg.starts_with("--pattern=") => patterns.push(arg.trim_start_matches("--pattern=").to_string()),
            _ if arg.starts_with("--max-steps=") => {
                options.max_steps = Some(parse_steps(arg.trim_start_matches("--max-steps="))?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                input = Some(std::iter::once(arg).chain(args.by_ref()).collect::<Vec<_>>().join(" "));
                break;
            }
        }
    }

    if patterns.is_empty() {
        return Err(format!("error: at least one --pattern is required\n\n{}", help_text()));
    }

    let input = match input {
        Some(value) if !value.trim().is_empty() => value,
        _ => read_stdin_input()?,
    };
    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { patterns, input, options, color })
}

fn parse_steps(value: &str) -> Result<usize, String> {
    value.parse().map_err(|_| format!("error: invalid --max-steps '{value}' (expected a positive integer)"))
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "seqex {version}

Search a token sequence with seqex patterns.

Usage:
  seqex [OPTIONS] -p <pattern> [-p <pattern>...] [--] <word/TAG...>

Input items are whitespace separated; the part after the last `/` becomes
the `tag` attribute. Without input arguments the sequence is read from stdin.

Options:
  -p, --pattern <pattern>    Pattern to search for. Repeat to run several
                             patterns and keep the best non-overlapping matches.
  --all                      Report overlapping matches (one per start position).
  --max-steps <n>            Abort a search after <n> machine steps.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Examples:
  seqex -p '(?$adj [tag:JJ]+) [tag:NN]' the/DT quick/JJ brown/JJ fox/NN
  RUST_LOG=seqex=trace seqex -p '\"fox\"' -- the fox

Exit codes:
  0  Success.
  1  Invalid pattern or failed search.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
