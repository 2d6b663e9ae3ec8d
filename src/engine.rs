use crate::error::FusionError;
use crate::gallery::{GalleryIndex, GalleryRows, LinearGallery, ShardedGallery};
use crate::scheme::{FusionScheme, GENERIC_SCHEME_FILE, TEMPLATE_SCHEME_FILE};
use crate::score_fusion::ScoreFusion;
use crate::template_fusion::TemplateFusion;
use crate::types::{CandidateList, ScoreFuserMode, Template, TemplateAction};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fusion of verification scores and identification candidate lists.
///
/// `initialize` must complete before the fusion operations are called. Once
/// initialized, the fusion operations only read the loaded scheme and may be
/// called concurrently through a shared reference.
pub trait ScoreFuser: Send + Sync {
    /// Loads the scheme for `mode` from a read-only configuration directory.
    fn initialize(&mut self, directory: &Path, mode: ScoreFuserMode) -> Result<(), FusionError>;

    /// Fuses K >= 2 scores, one per algorithm in scheme slot order.
    fn fuse_verification_scores(&self, input_scores: &[f64]) -> Result<f64, FusionError>;

    /// Fuses K >= 2 candidate lists of equal length L into L..=2L candidates.
    fn fuse_candidate_lists(
        &self,
        input_lists: &[CandidateList],
    ) -> Result<CandidateList, FusionError>;
}

/// Template fusion, verification and gallery search.
///
/// `create_gallery` takes `&mut self` and is therefore serialized against
/// `search`; every other operation after initialization is read-only.
pub trait TemplateFuser: Send + Sync {
    /// Initializes one capability. Each action may be initialized once.
    fn initialize(&mut self, directory: &Path, action: TemplateAction) -> Result<(), FusionError>;

    /// Fuses one template per algorithm into a fused template.
    fn fuse_templates(&self, input_templates: &[Template]) -> Result<Template, FusionError>;

    /// Similarity of two fused templates.
    fn verify(&self, enroll: &[f64], authentication: &[f64]) -> Result<f64, FusionError>;

    /// Builds the gallery from fused templates, `ids[i]` labelling `templates[i]`.
    fn create_gallery(&mut self, templates: &[Template], ids: &[u32]) -> Result<(), FusionError>;

    /// Fills `candidates` with the best gallery matches for `probe`.
    ///
    /// The caller sets the number of wanted candidates through
    /// `candidates.len()`. On success the list holds exactly that many, or
    /// every gallery entry when the gallery is smaller.
    fn search(&self, probe: &[f64], candidates: &mut CandidateList) -> Result<(), FusionError>;
}

/// Gallery index variant selected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryBackend {
    /// Exact single-threaded scan.
    Linear,
    /// Exact scan split across scoped threads.
    Sharded,
}

/// Construction-time options of the engines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub gallery: GalleryBackend,
    /// Number of shards used by [`GalleryBackend::Sharded`].
    pub shards: usize,
    /// Galleries smaller than this are scanned on the calling thread.
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let shards = std::thread::available_parallelism().map_or(4, NonZeroUsize::get);
        Self { gallery: GalleryBackend::Sharded, shards, parallel_threshold: 4096 }
    }
}

impl EngineConfig {
    fn shard_count(&self) -> Result<NonZeroUsize, FusionError> {
        NonZeroUsize::new(self.shards)
            .ok_or_else(|| FusionError::Config("shard count must be greater than 0".to_string()))
    }
}

/// Returns a score fuser ready for `initialize`.
pub fn score_fuser() -> Box<dyn ScoreFuser> {
    Box::new(ScoreFusionEngine::new())
}

/// Returns a template fuser using the gallery variant named in `config`.
pub fn template_fuser(config: EngineConfig) -> Result<Box<dyn TemplateFuser>, FusionError> {
    Ok(Box::new(TemplateFusionEngine::new(config)?))
}

/// Score fuser holding one loaded scheme per mode.
#[derive(Debug, Default)]
pub struct ScoreFusionEngine {
    verification: Option<ScoreFusion>,
    identification: Option<ScoreFusion>,
}

impl ScoreFusionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(directory: &Path, mode: ScoreFuserMode) -> Result<FusionScheme, FusionError> {
        match FusionScheme::locate(directory, &[mode.scheme_file(), GENERIC_SCHEME_FILE])? {
            Some(path) => FusionScheme::from_file(&path),
            None => {
                info!(
                    "No score fusion scheme in {}, using equal weights",
                    directory.display()
                );
                Ok(FusionScheme::default())
            }
        }
    }

    fn loaded(&self, mode: ScoreFuserMode) -> Result<&ScoreFusion, FusionError> {
        let fusion = match mode {
            ScoreFuserMode::Verification => self.verification.as_ref(),
            ScoreFuserMode::Identification => self.identification.as_ref(),
        };
        fusion.ok_or_else(|| {
            FusionError::NotImplemented(format!("{mode:?} score fusion was not initialized"))
        })
    }
}

impl ScoreFuser for ScoreFusionEngine {
    fn initialize(&mut self, directory: &Path, mode: ScoreFuserMode) -> Result<(), FusionError> {
        let slot = match mode {
            ScoreFuserMode::Verification => &mut self.verification,
            ScoreFuserMode::Identification => &mut self.identification,
        };
        if slot.is_some() {
            return Err(FusionError::Vendor(format!(
                "{mode:?} score fusion is already initialized"
            )));
        }

        let fusion = ScoreFusion::new(Self::load(directory, mode)?)?;
        info!("Initialized {:?} score fusion with scheme `{}`", mode, fusion.scheme().name);
        *slot = Some(fusion);
        Ok(())
    }

    fn fuse_verification_scores(&self, input_scores: &[f64]) -> Result<f64, FusionError> {
        self.loaded(ScoreFuserMode::Verification)?.fuse_scores(input_scores)
    }

    fn fuse_candidate_lists(
        &self,
        input_lists: &[CandidateList],
    ) -> Result<CandidateList, FusionError> {
        self.loaded(ScoreFuserMode::Identification)?.fuse_lists(input_lists)
    }
}

/// Template fuser with a lazily built gallery.
pub struct TemplateFusionEngine {
    config: EngineConfig,
    shards: NonZeroUsize,
    directory: Option<PathBuf>,
    fusion: Option<TemplateFusion>,
    initialized: HashSet<TemplateAction>,
    gallery: Option<Box<dyn GalleryIndex>>,
}

impl TemplateFusionEngine {
    pub fn new(config: EngineConfig) -> Result<Self, FusionError> {
        let shards = config.shard_count()?;
        Ok(Self {
            config,
            shards,
            directory: None,
            fusion: None,
            initialized: HashSet::new(),
            gallery: None,
        })
    }

    fn capability(&self, action: TemplateAction) -> Result<&TemplateFusion, FusionError> {
        match &self.fusion {
            Some(fusion) if self.initialized.contains(&action) => Ok(fusion),
            _ => Err(FusionError::NotImplemented(format!(
                "template fuser was not initialized for {action:?}"
            ))),
        }
    }

    /// Number of searchable gallery entries, if a gallery was built.
    pub fn gallery_len(&self) -> Option<usize> {
        self.gallery.as_ref().map(|gallery| gallery.len())
    }
}

impl TemplateFuser for TemplateFusionEngine {
    fn initialize(&mut self, directory: &Path, action: TemplateAction) -> Result<(), FusionError> {
        if self.initialized.contains(&action) {
            return Err(FusionError::Vendor(format!(
                "template fuser is already initialized for {action:?}"
            )));
        }
        if let Some(loaded) = &self.directory {
            if loaded != directory {
                return Err(FusionError::Config(format!(
                    "scheme already loaded from {}, refusing {}",
                    loaded.display(),
                    directory.display()
                )));
            }
        }

        if self.fusion.is_none() {
            let path = FusionScheme::locate(directory, &[TEMPLATE_SCHEME_FILE])?.ok_or_else(|| {
                FusionError::Config(format!(
                    "{TEMPLATE_SCHEME_FILE} not found in {}",
                    directory.display()
                ))
            })?;
            self.fusion = Some(TemplateFusion::new(FusionScheme::from_file(&path)?)?);
            self.directory = Some(directory.to_path_buf());
        }

        self.initialized.insert(action);
        info!("Initialized template fuser for {:?} from {}", action, directory.display());
        Ok(())
    }

    fn fuse_templates(&self, input_templates: &[Template]) -> Result<Template, FusionError> {
        self.capability(TemplateAction::Fuse)?.fuse(input_templates)
    }

    fn verify(&self, enroll: &[f64], authentication: &[f64]) -> Result<f64, FusionError> {
        self.capability(TemplateAction::Verify)?.verify(enroll, authentication)
    }

    fn create_gallery(&mut self, templates: &[Template], ids: &[u32]) -> Result<(), FusionError> {
        let rows = GalleryRows::build(self.capability(TemplateAction::Identify)?, templates, ids)?;
        let entries = rows.len();

        let gallery: Box<dyn GalleryIndex> = match self.config.gallery {
            GalleryBackend::Linear => Box::new(LinearGallery::new(rows)),
            GalleryBackend::Sharded => Box::new(ShardedGallery::new(
                rows,
                self.shards,
                self.config.parallel_threshold,
            )),
        };
        self.gallery = Some(gallery);

        info!(
            "Built {:?} gallery with {} of {} templates",
            self.config.gallery,
            entries,
            templates.len()
        );
        Ok(())
    }

    fn search(&self, probe: &[f64], candidates: &mut CandidateList) -> Result<(), FusionError> {
        let fusion = self.capability(TemplateAction::Identify)?;
        let gallery = self.gallery.as_ref().ok_or_else(|| {
            FusionError::InputLocation("search called before create_gallery".to_string())
        })?;

        let probe = fusion.normalized_fused(probe, "probe")?;
        let wanted = candidates.len();
        *candidates = gallery.top_matches(&probe, wanted)?;

        debug!("search returned {} of {} requested candidates", candidates.len(), wanted);
        Ok(())
    }
}
