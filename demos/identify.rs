use biofuse::{
    score_fuser, template_fuser, Candidate, CandidateList, EngineConfig, FusionError,
    GalleryBackend, ReturnStatus, ScoreFuserMode, Template, TemplateAction, TemplateFuser,
};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

const FACE_DIM: usize = 128;
const IRIS_DIM: usize = 64;

const DEMO_SCHEME: &str = "
; synthetic face + iris deployment
[scheme]
name = demo-face-iris
rule = mean
fused_dim = 96
min_valid = 1
seed = 2018

[algorithm]
name = face
weight = 2
calibration = identity
dim = 128

[algorithm]
name = iris
weight = 1
calibration = minmax:-1,1
dim = 64
";

#[derive(Parser, Debug)]
#[command(version, about = "Fuse synthetic templates, enroll a gallery and search it")]
struct Args {
    /// Directory holding template.scheme; a demo scheme is written when omitted
    #[arg(short = 'c', long = "config-dir")]
    config_dir: Option<PathBuf>,

    /// Number of enrolled subjects
    #[arg(short = 'g', long, default_value_t = 10_000)]
    gallery: u32,

    /// Number of candidates returned per search
    #[arg(short = 'm', long, default_value_t = 10)]
    candidates: usize,

    /// Gallery index variant
    #[arg(short = 'b', long, value_enum, default_value_t = Backend::Sharded)]
    backend: Backend,

    /// Probe subjects to search for
    #[arg(short = 'p', long, num_args = 1.., default_values_t = [7, 4242])]
    probes: Vec<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Linear,
    Sharded,
}

fn initialize_logging() {
    let subscriber = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {e}");
        std::process::exit(1);
    }
}

/// Deterministic per-algorithm features; `noise` stands in for a second capture.
fn features(subject: u32, dim: usize, salt: f64, noise: f64) -> Template {
    (0..dim)
        .map(|j| {
            let base = ((subject as f64 + 1.0) * (j as f64 + salt) * 0.618).sin();
            base + noise * (j as f64 * 7.3 + subject as f64).cos()
        })
        .collect()
}

fn capture(fuser: &dyn TemplateFuser, subject: u32, noise: f64) -> Result<Template, FusionError> {
    fuser.fuse_templates(&[
        features(subject, FACE_DIM, 0.5, noise),
        features(subject, IRIS_DIM, 3.1, noise),
    ])
}

fn scheme_directory(args: &Args) -> Result<PathBuf, FusionError> {
    if let Some(dir) = &args.config_dir {
        return Ok(dir.clone());
    }
    let dir = std::env::temp_dir().join(format!("biofuse-demo-{}", std::process::id()));
    fs::create_dir_all(&dir)
        .and_then(|_| fs::write(dir.join("template.scheme"), DEMO_SCHEME))
        .map_err(|e| FusionError::InputLocation(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

fn run(args: &Args, dir: &Path) -> Result<(), FusionError> {
    let config = EngineConfig {
        gallery: match args.backend {
            Backend::Linear => GalleryBackend::Linear,
            Backend::Sharded => GalleryBackend::Sharded,
        },
        ..EngineConfig::default()
    };
    let mut fuser = template_fuser(config)?;
    for action in [TemplateAction::Fuse, TemplateAction::Verify, TemplateAction::Identify] {
        fuser.initialize(dir, action)?;
    }

    let templates = (0..args.gallery)
        .map(|subject| capture(fuser.as_ref(), subject, 0.0))
        .collect::<Result<Vec<_>, _>>()?;
    let ids: Vec<u32> = (0..args.gallery).collect();
    fuser.create_gallery(&templates, &ids)?;

    let mut lists = Vec::new();
    for &subject in &args.probes {
        let probe = capture(fuser.as_ref(), subject, 0.02)?;
        let mut candidates: CandidateList = vec![Candidate::default(); args.candidates];
        fuser.search(&probe, &mut candidates)?;

        let ranked: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        info!("Probe {}: {}", subject, ranked.join(" "));

        if let Some(enrolled) = templates.get(subject as usize) {
            info!("Probe {} verify score {:.6}", subject, fuser.verify(enrolled, &probe)?);
        }
        lists.push(candidates);
    }

    if lists.len() >= 2 && lists.iter().all(|list| list.len() == args.candidates) {
        let mut scores = score_fuser();
        scores.initialize(dir, ScoreFuserMode::Identification)?;
        let fused = scores.fuse_candidate_lists(&lists[..2])?;
        let ranked: Vec<String> = fused.iter().map(ToString::to_string).collect();
        info!("Fused candidate list of the first two probes: {}", ranked.join(" "));
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    initialize_logging();

    let result = scheme_directory(&args).and_then(|dir| run(&args, &dir));
    if let Err(e) = &result {
        error!("{}", ReturnStatus::from(e));
        std::process::exit(i32::from(e.code().as_u8()));
    }
}
