//! Flag value grammar.
//!
//! Durations use the compact notation `1h2m`, `1.5s`, `250ms`, `10us`, `5ns`.
//! Algorithms and transformations are written `name[arg,arg]`:
//!
//! | expression  | meaning                                   |
//! |-------------|-------------------------------------------|
//! | `inc[D,D]`  | incremental: initial, increment           |
//! | `lin[D]`    | linear: factor                            |
//! | `exp[D,F]`  | exponential: factor, base                 |
//! | `binexp[D]` | binary exponential: factor                |
//! | `fib[D]`    | fibonacci: factor                         |
//! | `full`      | full jitter                               |
//! | `equal`     | equal jitter                              |
//! | `dev[F]`    | deviation by factor                       |
//! | `ndist[D]`  | normal distribution with std deviation    |

use regex::Regex;
use retrier_core::backoff::{self, Algorithm};
use retrier_core::jitter::{self, Transformation};
use retrier_core::strategy::{self, Strategy};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid duration {0:?}")]
    Duration(String),
    #[error("invalid number {0:?}")]
    Number(String),
    #[error("invalid expression {0:?}, expected name[arg,...]")]
    Syntax(String),
    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("unknown transformation {0:?}")]
    UnknownTransformation(String),
    #[error("{name} takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("expected \"ALGORITHM TRANSFORMATION\", got {0:?}")]
    JitteredBackoff(String),
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        _ => return None,
    })
}

fn duration_component() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+\.?\d*|\.\d+)(ns|us|µs|ms|s|m|h)").expect("valid duration regex")
    })
}

fn expression() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+)(?:\[([^\[\]]*)\])?$").expect("valid expression regex"))
}

/// Parse a duration such as `1h2m`, `1.5s` or `250ms`. A bare `0` is zero.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let invalid = || ParseError::Duration(input.to_string());
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    let mut consumed = 0;
    for caps in duration_component().captures_iter(s) {
        let (Some(whole), Some(number), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            return Err(invalid());
        };
        // Components must be contiguous: "1s x 2s" is not a duration.
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();
        let unit = unit_nanos(unit.as_str()).ok_or_else(invalid)?;
        let nanos = component_nanos(number.as_str(), unit).ok_or_else(invalid)?;
        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }
    if consumed != s.len() {
        return Err(invalid());
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

fn component_nanos(number: &str, unit: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit)?;
    if !frac.is_empty() {
        // Digits past nanosecond precision of the largest unit do not matter.
        let digits = &frac[..frac.len().min(18)];
        let value: u128 = digits.parse().ok()?;
        nanos = nanos.checked_add(value * unit / 10u128.pow(digits.len() as u32))?;
    }
    Some(nanos)
}

fn parse_float(input: &str) -> Result<f64, ParseError> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| ParseError::Number(input.to_string()))
}

/// Split `name[a,b]` into its name and arguments.
fn split_expression(input: &str) -> Result<(&str, Vec<&str>), ParseError> {
    let caps = expression()
        .captures(input.trim())
        .ok_or_else(|| ParseError::Syntax(input.to_string()))?;
    let name = caps.get(1).map_or("", |m| m.as_str());
    let args = match caps.get(2) {
        Some(m) if !m.as_str().trim().is_empty() => m.as_str().split(',').map(str::trim).collect(),
        _ => Vec::new(),
    };
    Ok((name, args))
}

fn expect_args(name: &str, args: &[&str], expected: usize) -> Result<(), ParseError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ParseError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

/// A backoff algorithm as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlgorithmSpec {
    Incremental { initial: Duration, increment: Duration },
    Linear(Duration),
    Exponential { factor: Duration, base: f64 },
    BinaryExponential(Duration),
    Fibonacci(Duration),
}

impl AlgorithmSpec {
    pub fn build(&self) -> Algorithm {
        match *self {
            AlgorithmSpec::Incremental { initial, increment } => {
                backoff::incremental(initial, increment)
            }
            AlgorithmSpec::Linear(factor) => backoff::linear(factor),
            AlgorithmSpec::Exponential { factor, base } => backoff::exponential(factor, base),
            AlgorithmSpec::BinaryExponential(factor) => backoff::binary_exponential(factor),
            AlgorithmSpec::Fibonacci(factor) => backoff::fibonacci(factor),
        }
    }
}

impl FromStr for AlgorithmSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_expression(s)?;
        let spec = match name {
            "inc" => {
                expect_args(name, &args, 2)?;
                AlgorithmSpec::Incremental {
                    initial: parse_duration(args[0])?,
                    increment: parse_duration(args[1])?,
                }
            }
            "lin" => {
                expect_args(name, &args, 1)?;
                AlgorithmSpec::Linear(parse_duration(args[0])?)
            }
            "exp" => {
                expect_args(name, &args, 2)?;
                AlgorithmSpec::Exponential {
                    factor: parse_duration(args[0])?,
                    base: parse_float(args[1])?,
                }
            }
            "binexp" => {
                expect_args(name, &args, 1)?;
                AlgorithmSpec::BinaryExponential(parse_duration(args[0])?)
            }
            "fib" => {
                expect_args(name, &args, 1)?;
                AlgorithmSpec::Fibonacci(parse_duration(args[0])?)
            }
            other => return Err(ParseError::UnknownAlgorithm(other.to_string())),
        };
        Ok(spec)
    }
}

/// A jitter transformation as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JitterSpec {
    Full,
    Equal,
    Deviation(f64),
    NormalDistribution(Duration),
}

impl JitterSpec {
    /// Build with a fresh OS-seeded generator.
    pub fn build(&self) -> Transformation {
        match *self {
            JitterSpec::Full => jitter::full(None),
            JitterSpec::Equal => jitter::equal(None),
            JitterSpec::Deviation(factor) => jitter::deviation(None, factor),
            JitterSpec::NormalDistribution(std_dev) => jitter::normal_distribution(None, std_dev),
        }
    }
}

impl FromStr for JitterSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_expression(s)?;
        let spec = match name {
            "full" => {
                expect_args(name, &args, 0)?;
                JitterSpec::Full
            }
            "equal" => {
                expect_args(name, &args, 0)?;
                JitterSpec::Equal
            }
            "dev" => {
                expect_args(name, &args, 1)?;
                JitterSpec::Deviation(parse_float(args[0])?)
            }
            "ndist" => {
                expect_args(name, &args, 1)?;
                JitterSpec::NormalDistribution(parse_duration(args[0])?)
            }
            other => return Err(ParseError::UnknownTransformation(other.to_string())),
        };
        Ok(spec)
    }
}

/// `"ALGORITHM TRANSFORMATION"`, the value of `--tbackoff`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitteredBackoff {
    pub algorithm: AlgorithmSpec,
    pub jitter: JitterSpec,
}

impl FromStr for JitteredBackoff {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [algorithm, jitter] = parts[..] else {
            return Err(ParseError::JitteredBackoff(s.to_string()));
        };
        Ok(Self {
            algorithm: algorithm.parse()?,
            jitter: jitter.parse()?,
        })
    }
}

/// Comma-separated durations, the value of `--wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitList(pub Vec<Duration>);

impl FromStr for WaitList {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(parse_duration)
            .collect::<Result<Vec<_>, _>>()
            .map(WaitList)
    }
}

/// One strategy flag, in the order it appeared on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategySpec {
    Infinite,
    Limit(u32),
    Delay(Duration),
    Wait(Vec<Duration>),
    Backoff(AlgorithmSpec),
    BackoffWithJitter(JitteredBackoff),
}

impl StrategySpec {
    pub fn build(&self) -> Strategy {
        match self {
            StrategySpec::Infinite => strategy::infinite(),
            StrategySpec::Limit(n) => strategy::limit(*n),
            StrategySpec::Delay(d) => strategy::delay(*d),
            StrategySpec::Wait(durations) => strategy::wait(durations.iter().copied()),
            StrategySpec::Backoff(algorithm) => strategy::backoff(algorithm.build()),
            StrategySpec::BackoffWithJitter(tb) => {
                strategy::backoff_with_jitter(tb.algorithm.build(), tb.jitter.build())
            }
        }
    }
}
