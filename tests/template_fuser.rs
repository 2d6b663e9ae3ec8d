use biofuse::{
    template_fuser, CandidateList, EngineConfig, FusionError, GalleryBackend, ReturnCode,
    ReturnStatus, Template, TemplateAction, TemplateFuser,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

const FACE_DIM: usize = 48;
const IRIS_DIM: usize = 24;
const FUSED_DIM: usize = 32;

const TEMPLATE_SCHEME: &str = "
; face + iris fused into 32 dimensions
[scheme]
name = face-iris-templates
fused_dim = 32
min_valid = 1
seed = 2018

[algorithm]
name = face
weight = 2
dim = 48

[algorithm]
name = iris
weight = 1
dim = 24
";

fn scheme_dir(test: &str, scheme: Option<&str>) -> PathBuf {
    let dir =
        std::env::temp_dir().join(format!("biofuse-template-{test}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    if let Err(e) = fs::create_dir_all(&dir) {
        panic!("Failed to create scheme directory: {e}");
    }
    if let Some(scheme) = scheme {
        if let Err(e) = fs::write(dir.join("template.scheme"), scheme) {
            panic!("Failed to write template.scheme: {e}");
        }
    }
    dir
}

fn engine(
    test: &str,
    config: EngineConfig,
    actions: &[TemplateAction],
) -> Box<dyn TemplateFuser> {
    let dir = scheme_dir(test, Some(TEMPLATE_SCHEME));
    let mut fuser = match template_fuser(config) {
        Ok(fuser) => fuser,
        Err(e) => panic!("Failed to create template fuser: {e}"),
    };
    for action in actions {
        if let Err(e) = fuser.initialize(&dir, *action) {
            panic!("Failed to initialize {action:?}: {e}");
        }
    }
    fuser
}

const ALL_ACTIONS: [TemplateAction; 3] =
    [TemplateAction::Fuse, TemplateAction::Verify, TemplateAction::Identify];

/// Synthetic per-algorithm features for one subject; `noise` perturbs a sample.
fn features(subject: u32, dim: usize, salt: f64, noise: f64) -> Template {
    (0..dim)
        .map(|j| {
            let base = ((subject as f64 + 1.0) * (j as f64 + salt) * 0.618).sin();
            base + noise * (j as f64 * 7.3 + subject as f64).cos()
        })
        .collect()
}

fn fused(fuser: &dyn TemplateFuser, subject: u32, noise: f64) -> Template {
    let inputs = vec![
        features(subject, FACE_DIM, 0.5, noise),
        features(subject, IRIS_DIM, 3.1, noise),
    ];
    match fuser.fuse_templates(&inputs) {
        Ok(template) => template,
        Err(e) => panic!("Template fusion failed for subject {subject}: {e}"),
    }
}

fn build_gallery(fuser: &mut dyn TemplateFuser, subjects: u32) -> Vec<Template> {
    let templates: Vec<Template> = (0..subjects).map(|s| fused(&*fuser, s, 0.0)).collect();
    let ids: Vec<u32> = (0..subjects).collect();
    if let Err(e) = fuser.create_gallery(&templates, &ids) {
        panic!("Failed to create gallery: {e}");
    }
    templates
}

fn search(fuser: &dyn TemplateFuser, probe: &[f64], wanted: usize) -> CandidateList {
    let mut candidates = CandidateList::with_capacity(wanted);
    candidates.resize(wanted, Default::default());
    match fuser.search(probe, &mut candidates) {
        Ok(()) => candidates,
        Err(e) => panic!("Search failed: {e}"),
    }
}

#[test]
fn test_fused_templates_have_fixed_dimension() {
    let fuser = engine("dimension", EngineConfig::default(), &ALL_ACTIONS);
    assert_eq!(fused(fuser.as_ref(), 3, 0.0).len(), FUSED_DIM);

    let iris_failed = fuser.fuse_templates(&[features(3, FACE_DIM, 0.5, 0.0), vec![]]);
    match iris_failed {
        Ok(template) => assert_eq!(template.len(), FUSED_DIM),
        Err(e) => panic!("Fusion with one failed slot should succeed: {e}"),
    }
}

#[test]
fn test_all_failed_inputs_are_refused() {
    let fuser = engine("refusal", EngineConfig::default(), &ALL_ACTIONS);
    let result = fuser.fuse_templates(&[vec![], vec![]]);
    assert_eq!(ReturnStatus::from(&result).code, ReturnCode::TemplateCreationError);
    if let Err(e) = result {
        assert!(e.is_refusal());
    }
}

#[test]
fn test_strict_scheme_refuses_partial_input() {
    let strict = TEMPLATE_SCHEME.replace("min_valid = 1", "min_valid = 2");
    let dir = scheme_dir("strict", Some(&strict));
    let mut fuser = match template_fuser(EngineConfig::default()) {
        Ok(fuser) => fuser,
        Err(e) => panic!("Failed to create template fuser: {e}"),
    };
    if let Err(e) = fuser.initialize(&dir, TemplateAction::Fuse) {
        panic!("Failed to initialize: {e}");
    }

    let result = fuser.fuse_templates(&[features(1, FACE_DIM, 0.5, 0.0), vec![]]);
    assert!(matches!(result, Err(FusionError::TemplateCreation(_))));
}

#[test]
fn test_malformed_inputs() {
    let fuser = engine("malformed", EngineConfig::default(), &ALL_ACTIONS);

    let wrong_dim = fuser.fuse_templates(&[vec![1.0; FACE_DIM - 1], vec![1.0; IRIS_DIM]]);
    assert_eq!(ReturnStatus::from(&wrong_dim).code, ReturnCode::TemplateFormatError);

    let one_slot = fuser.fuse_templates(&[vec![1.0; FACE_DIM]]);
    assert_eq!(ReturnStatus::from(&one_slot).code, ReturnCode::NumDataError);

    let probe = vec![1.0; FUSED_DIM + 3];
    let verify = fuser.verify(&probe, &probe);
    assert_eq!(ReturnStatus::from(&verify).code, ReturnCode::TemplateFormatError);

    let failed = fuser.verify(&[], &vec![1.0; FUSED_DIM]);
    assert_eq!(ReturnStatus::from(&failed).code, ReturnCode::VerifTemplateError);
}

#[test]
fn test_genuine_scores_above_impostor() {
    let fuser = engine("verify", EngineConfig::default(), &ALL_ACTIONS);
    let enroll = fused(fuser.as_ref(), 17, 0.0);
    let genuine_probe = fused(fuser.as_ref(), 17, 0.01);
    let impostor_probe = fused(fuser.as_ref(), 240, 0.01);

    let genuine = match fuser.verify(&enroll, &genuine_probe) {
        Ok(score) => score,
        Err(e) => panic!("Verification failed: {e}"),
    };
    let impostor = match fuser.verify(&enroll, &impostor_probe) {
        Ok(score) => score,
        Err(e) => panic!("Verification failed: {e}"),
    };

    assert!(genuine > 0.95, "genuine score {genuine}");
    assert!(genuine > impostor, "genuine {genuine} <= impostor {impostor}");
    assert_eq!(fuser.verify(&enroll, &genuine_probe), Ok(genuine));
}

#[test]
fn test_ordering_violations() {
    let dir = scheme_dir("ordering", Some(TEMPLATE_SCHEME));
    let mut fuser = match template_fuser(EngineConfig::default()) {
        Ok(fuser) => fuser,
        Err(e) => panic!("Failed to create template fuser: {e}"),
    };
    let probe = vec![1.0; FUSED_DIM];

    let mut candidates = vec![Default::default(); 3];
    let early = fuser.search(&probe, &mut candidates);
    assert_eq!(ReturnStatus::from(&early).code, ReturnCode::NotImplemented);

    if let Err(e) = fuser.initialize(&dir, TemplateAction::Identify) {
        panic!("Failed to initialize: {e}");
    }
    let no_gallery = fuser.search(&probe, &mut candidates);
    assert_eq!(ReturnStatus::from(&no_gallery).code, ReturnCode::InputLocationError);

    let not_fuse = fuser.fuse_templates(&[vec![1.0; FACE_DIM], vec![1.0; IRIS_DIM]]);
    assert!(matches!(not_fuse, Err(FusionError::NotImplemented(_))));

    assert!(matches!(
        fuser.initialize(&dir, TemplateAction::Identify),
        Err(FusionError::Vendor(_))
    ));

    let elsewhere = scheme_dir("ordering-elsewhere", Some(TEMPLATE_SCHEME));
    assert!(matches!(
        fuser.initialize(&elsewhere, TemplateAction::Verify),
        Err(FusionError::Config(_))
    ));
}

#[test]
fn test_missing_template_scheme() {
    let dir = scheme_dir("no-scheme", None);
    let mut fuser = match template_fuser(EngineConfig::default()) {
        Ok(fuser) => fuser,
        Err(e) => panic!("Failed to create template fuser: {e}"),
    };
    let result = fuser.initialize(&dir, TemplateAction::Fuse);
    assert_eq!(ReturnStatus::from(&result).code, ReturnCode::ConfigError);
}

#[test]
fn test_zero_shards_rejected() {
    let config = EngineConfig { shards: 0, ..EngineConfig::default() };
    assert!(matches!(template_fuser(config), Err(FusionError::Config(_))));
}

#[test]
fn test_create_gallery_rejects_mismatched_lengths() {
    let mut fuser = engine("mismatch", EngineConfig::default(), &ALL_ACTIONS);
    let templates = vec![fused(fuser.as_ref(), 1, 0.0), fused(fuser.as_ref(), 2, 0.0)];
    let result = fuser.create_gallery(&templates, &[1]);
    assert_eq!(ReturnStatus::from(&result).code, ReturnCode::NonCongruentVectors);

    let mut candidates = vec![Default::default(); 1];
    let after = fuser.search(&templates[0], &mut candidates);
    assert_eq!(ReturnStatus::from(&after).code, ReturnCode::InputLocationError);
}

#[test]
fn test_search_returns_top_m_of_large_gallery() {
    let mut fuser = engine("large", EngineConfig::default(), &ALL_ACTIONS);
    let templates = build_gallery(fuser.as_mut(), 1000);
    let probe = &templates[123];

    let first = search(fuser.as_ref(), probe, 10);
    let second = search(fuser.as_ref(), probe, 10);

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(first[0].identity, 123);
    assert!((first[0].score - 1.0).abs() < 1e-9);

    match fuser.verify(&templates[7], probe) {
        Ok(score) => {
            let listed = first.iter().find(|c| c.identity == 7).map(|c| c.score);
            if let Some(listed) = listed {
                assert_eq!(listed, score);
            }
        }
        Err(e) => panic!("Verification failed: {e}"),
    }
}

#[test]
fn test_search_larger_than_gallery_returns_all() {
    let mut fuser = engine("small", EngineConfig::default(), &ALL_ACTIONS);
    let templates = build_gallery(fuser.as_mut(), 6);

    let candidates = search(fuser.as_ref(), &templates[2], 25);
    assert_eq!(candidates.len(), 6);

    let empty = search(fuser.as_ref(), &templates[2], 0);
    assert!(empty.is_empty());
}

#[test]
fn test_failed_enrollments_are_not_searchable() {
    let mut fuser = engine("failed-enroll", EngineConfig::default(), &ALL_ACTIONS);
    let templates = vec![fused(fuser.as_ref(), 1, 0.0), vec![], fused(fuser.as_ref(), 3, 0.0)];
    if let Err(e) = fuser.create_gallery(&templates, &[1, 2, 3]) {
        panic!("Failed to create gallery: {e}");
    }

    let candidates = search(fuser.as_ref(), &templates[0], 5);
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|c| c.identity != 2));
}

#[test]
fn test_backends_agree() {
    let linear_config =
        EngineConfig { gallery: GalleryBackend::Linear, ..EngineConfig::default() };
    let sharded_config = EngineConfig {
        gallery: GalleryBackend::Sharded,
        shards: 5,
        parallel_threshold: 0,
    };

    let mut linear = engine("linear", linear_config, &ALL_ACTIONS);
    let mut sharded = engine("sharded", sharded_config, &ALL_ACTIONS);
    let templates = build_gallery(linear.as_mut(), 300);
    build_gallery(sharded.as_mut(), 300);

    for probe in [&templates[0], &templates[150], &templates[299]] {
        assert_eq!(search(linear.as_ref(), probe, 20), search(sharded.as_ref(), probe, 20));
    }
}

#[test]
fn test_concurrent_searches() {
    let mut fuser = engine("concurrent", EngineConfig::default(), &ALL_ACTIONS);
    let templates = build_gallery(fuser.as_mut(), 200);
    let fuser: Arc<dyn TemplateFuser> = Arc::from(fuser);
    let probe = templates[42].clone();
    let expected = search(fuser.as_ref(), &probe, 8);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fuser = Arc::clone(&fuser);
            let probe = probe.clone();
            thread::spawn(move || search(fuser.as_ref(), &probe, 8))
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(candidates) => assert_eq!(candidates, expected),
            Err(_) => panic!("search thread panicked"),
        }
    }
}
