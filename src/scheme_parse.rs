use crate::calibration::Calibration;
use crate::error::FusionError;
use crate::scheme::{AlgorithmProfile, CombineRule, FusionScheme};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, space0};
use nom::combinator::{map, rest, value};
use nom::number::complete::double;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::{IResult, Parser};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Scheme,
    Algorithm,
}

#[derive(Debug, Default)]
struct AlgorithmDraft {
    name: Option<String>,
    weight: Option<f64>,
    calibration: Option<Calibration>,
    dim: Option<usize>,
}

impl FromStr for FusionScheme {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut scheme = FusionScheme::default();
        let mut drafts: Vec<AlgorithmDraft> = vec![];
        let mut cur_section = None;

        for (index, line) in s.lines().enumerate() {
            let line = line.trim();
            let lineno = index + 1;

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') {
                let section = match parse_section(line) {
                    Ok(("", name)) => name,
                    _ => return Err(bad_line(lineno, "malformed section header", line)),
                };
                cur_section = match section {
                    "scheme" => Some(Section::Scheme),
                    "algorithm" => {
                        drafts.push(AlgorithmDraft::default());
                        Some(Section::Algorithm)
                    }
                    _ => return Err(bad_line(lineno, "unknown section", line)),
                };
                continue;
            }

            let Some(section) = cur_section else {
                return Err(bad_line(lineno, "unexpected line outside a section", line));
            };

            let (key, value) = match parse_named_value(line) {
                Ok((_, (key, value))) => (key, value.trim()),
                Err(_) => return Err(bad_line(lineno, "expected `key = value`", line)),
            };

            match (section, key) {
                (Section::Scheme, "name") => scheme.name = value.to_string(),
                (Section::Scheme, "rule") => {
                    scheme.rule = value.parse().map_err(|e| wrap(lineno, e))?;
                }
                (Section::Scheme, "fused_dim") => {
                    scheme.fused_dim = Some(parse_dim(lineno, value)?);
                }
                (Section::Scheme, "min_valid") => {
                    scheme.min_valid = parse_dim(lineno, value)?;
                }
                (Section::Scheme, "seed") => {
                    scheme.seed = value
                        .parse()
                        .map_err(|_| bad_line(lineno, "seed is not an unsigned integer", line))?;
                }
                (Section::Algorithm, _) => {
                    // A `[algorithm]` header always pushed a draft before we got here.
                    let Some(draft) = drafts.last_mut() else {
                        return Err(bad_line(lineno, "algorithm value without section", line));
                    };
                    match key {
                        "name" => draft.name = Some(value.to_string()),
                        "weight" => {
                            let weight: f64 = value
                                .parse()
                                .map_err(|_| bad_line(lineno, "weight is not a number", line))?;
                            if !weight.is_finite() || weight <= 0.0 {
                                return Err(bad_line(lineno, "weight must be positive", line));
                            }
                            draft.weight = Some(weight);
                        }
                        "calibration" => {
                            let calibration: Calibration =
                                value.parse().map_err(|e| wrap(lineno, e))?;
                            calibration.validate().map_err(|e| wrap(lineno, e))?;
                            draft.calibration = Some(calibration);
                        }
                        "dim" => draft.dim = Some(parse_dim(lineno, value)?),
                        _ => warn!("skip unknown algorithm key `{}` at line {}", key, lineno),
                    }
                }
                (Section::Scheme, _) => {
                    warn!("skip unknown scheme key `{}` at line {}", key, lineno);
                }
            }
        }

        let mut names = HashSet::new();
        for (slot, draft) in drafts.into_iter().enumerate() {
            let name = draft.name.unwrap_or_else(|| format!("slot-{slot}"));
            if !names.insert(name.clone()) {
                return Err(FusionError::Config(format!("duplicate algorithm name `{name}`")));
            }

            let profile = AlgorithmProfile {
                name,
                weight: draft.weight.unwrap_or(1.0),
                calibration: draft.calibration.unwrap_or_default(),
                dim: draft.dim,
            };
            trace!("algorithm slot {}: {:?}", slot, profile);
            scheme.algorithms.push(profile);
        }

        if scheme.algorithms.len() == 1 {
            return Err(FusionError::Config(format!(
                "scheme `{}` declares a single algorithm, fusion needs at least 2",
                scheme.name
            )));
        }
        if scheme.min_valid == 0 {
            return Err(FusionError::Config("min_valid must be at least 1".to_string()));
        }
        if !scheme.algorithms.is_empty() && scheme.min_valid > scheme.algorithms.len() {
            return Err(FusionError::Config(format!(
                "min_valid {} exceeds the {} declared algorithms",
                scheme.min_valid,
                scheme.algorithms.len()
            )));
        }

        Ok(scheme)
    }
}

fn bad_line(lineno: usize, reason: &str, line: &str) -> FusionError {
    FusionError::Config(format!("line {lineno}: {reason}: {line}"))
}

fn wrap(lineno: usize, err: FusionError) -> FusionError {
    FusionError::Config(format!("line {lineno}: {}", err.info()))
}

fn parse_dim(lineno: usize, value: &str) -> Result<usize, FusionError> {
    match value.parse::<usize>() {
        Ok(dim) if dim > 0 => Ok(dim),
        _ => Err(bad_line(lineno, "expected a positive integer", value)),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn parse_section(input: &str) -> IResult<&str, &str> {
    delimited(
        char('['),
        delimited(space0, take_while1(is_name_char), space0),
        char(']'),
    )
    .parse(input)
}

fn parse_named_value(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_while1(is_name_char), (space0, char('='), space0), rest).parse(input)
}

fn parse_pair(input: &str) -> IResult<&str, (f64, f64)> {
    separated_pair(double, (space0, char(','), space0), double).parse(input)
}

fn parse_calibration(input: &str) -> IResult<&str, Calibration> {
    alt((
        value(Calibration::Identity, tag("identity")),
        map(preceded(tag("minmax:"), parse_pair), |(min, max)| {
            Calibration::MinMax { min, max }
        }),
        map(preceded(tag("zscore:"), parse_pair), |(mean, std)| {
            Calibration::ZScore { mean, std }
        }),
        map(preceded(tag("logistic:"), parse_pair), |(slope, offset)| {
            Calibration::Logistic { slope, offset }
        }),
    ))
    .parse(input)
}

fn parse_rule(input: &str) -> IResult<&str, CombineRule> {
    alt((
        value(CombineRule::Mean, tag("mean")),
        value(CombineRule::Max, tag("max")),
        value(CombineRule::Geometric, tag("geometric")),
    ))
    .parse(input)
}

macro_rules! impl_from_str {
    ($ty:ty, $parse:ident) => {
        impl FromStr for $ty {
            type Err = FusionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (remaining, res) = $parse(s).map_err(|err| {
                    FusionError::Config(format!(
                        "parse {} failed: {}, {}",
                        stringify!($ty),
                        s,
                        err
                    ))
                })?;

                if !remaining.is_empty() {
                    Err(FusionError::Config(format!(
                        "parse {} failed, remaining: {}",
                        stringify!($ty),
                        remaining
                    )))
                } else {
                    Ok(res)
                }
            }
        }
    };
}

impl_from_str!(Calibration, parse_calibration);
impl_from_str!(CombineRule, parse_rule);
