use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use facesign_core::config::SignConfig;
use facesign_core::detection::domain::face_detector::FaceDetector;
use facesign_core::detection::domain::face_selector::FaceSelector;
use facesign_core::detection::infrastructure::full_frame_detector::FullFrameDetector;
use facesign_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facesign_core::embedding::domain::embedding_extractor::EmbeddingExtractor;
use facesign_core::embedding::infrastructure::histogram_extractor::HistogramEmbeddingExtractor;
use facesign_core::embedding::infrastructure::onnx_arcface_extractor::OnnxArcFaceExtractor;
use facesign_core::pipeline::audit_logger::{AuditLogger, LogAuditLogger};
use facesign_core::pipeline::enroll_identity_use_case::EnrollIdentityUseCase;
use facesign_core::pipeline::face_embedder::FaceEmbedder;
use facesign_core::pipeline::sign_document_use_case::SignDocumentUseCase;
use facesign_core::shared::constants::{
    APP_DIR_NAME, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, JOURNAL_FILE_NAME,
    TEMPLATES_DIR_NAME, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use facesign_core::shared::ids::{DocumentId, IdentityId};
use facesign_core::shared::model_resolver::{self, ModelSource};
use facesign_core::shared::probe_image::ProbeImage;
use facesign_core::signing::domain::sign_outcome::SignResponse;
use facesign_core::signing::infrastructure::journal_signature_repository::JournalSignatureRepository;
use facesign_core::templates::domain::template_store::TemplateStore;
use facesign_core::templates::infrastructure::json_template_store::JsonTemplateStore;

/// Exit code when verification ran but the document was not signed.
const EXIT_NOT_SIGNED: i32 = 2;

/// Face-verified document signing.
#[derive(Parser)]
#[command(name = "facesign")]
struct Cli {
    /// JSON config file (thresholds, timeout). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding templates and the signature journal.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Face detector.
    #[arg(long, global = true, value_enum, default_value_t = DetectorKind::Yolo)]
    detector: DetectorKind,

    /// Embedding extractor. Templates only match probes from the same one.
    #[arg(long, global = true, value_enum, default_value_t = ExtractorKind::Arcface)]
    extractor: ExtractorKind,

    /// Directory checked for ONNX models before the user cache.
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Fail instead of downloading missing models.
    #[arg(long, global = true)]
    no_download: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll (or re-enroll) an identity from one or more face photos.
    Enroll {
        #[arg(long)]
        identity: u64,

        #[arg(long)]
        name: Option<String>,

        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Remove an identity's enrolled template.
    Unenroll {
        #[arg(long)]
        identity: u64,
    },
    /// Verify probe photos against an identity and sign the document on a match.
    Sign {
        #[arg(long)]
        document: u64,

        #[arg(long)]
        identity: u64,

        #[arg(required = true)]
        probes: Vec<PathBuf>,
    },
    /// Run the signature journal recovery sweep and print its report.
    Recover,
}

#[derive(Clone, Copy, ValueEnum)]
enum DetectorKind {
    /// YOLO face detector (ONNX).
    Yolo,
    /// Treat each image as one pre-cropped face.
    FullFrame,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtractorKind {
    /// ArcFace embeddings (ONNX).
    Arcface,
    /// Model-free color histogram embeddings.
    Histogram,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SignConfig::load(path)?,
        None => SignConfig::default(),
    };
    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;

    match &cli.command {
        Command::Enroll {
            identity,
            name,
            photos,
        } => {
            let templates: Arc<dyn TemplateStore> =
                Arc::new(JsonTemplateStore::open(&data_dir.join(TEMPLATES_DIR_NAME))?);
            let embedder = build_embedder(&cli, &config)?;
            let photos = load_images(photos)?;

            let template = EnrollIdentityUseCase::new(embedder, templates).execute(
                IdentityId(*identity),
                name.clone(),
                &photos,
            )?;
            log::info!(
                "Enrolled identity {} ({} embeddings, {}-D)",
                template.identity_id,
                template.embeddings.len(),
                template.dimension()
            );
            Ok(0)
        }
        Command::Unenroll { identity } => {
            let templates = JsonTemplateStore::open(&data_dir.join(TEMPLATES_DIR_NAME))?;
            if templates.remove(IdentityId(*identity))? {
                log::info!("Removed identity {identity}");
            } else {
                log::info!("Identity {identity} was not enrolled");
            }
            Ok(0)
        }
        Command::Sign {
            document,
            identity,
            probes,
        } => {
            let templates: Arc<dyn TemplateStore> =
                Arc::new(JsonTemplateStore::open(&data_dir.join(TEMPLATES_DIR_NAME))?);
            let signatures = Arc::new(JournalSignatureRepository::open(
                &data_dir.join(JOURNAL_FILE_NAME),
            )?);
            let audit = Arc::new(LogAuditLogger::new());
            let embedder = build_embedder(&cli, &config)?;
            let probes = load_images(probes)?;

            let use_case =
                SignDocumentUseCase::new(embedder, templates, signatures, audit.clone(), config);
            let result =
                use_case.sign_document(DocumentId(*document), IdentityId(*identity), probes);
            audit.summary();

            let response = SignResponse::from_result(&result);
            println!("{}", serde_json::to_string_pretty(&response)?);
            match result {
                Ok(outcome) if outcome.signed => Ok(0),
                Ok(_) => Ok(EXIT_NOT_SIGNED),
                Err(e) => Err(e.into()),
            }
        }
        Command::Recover => {
            let signatures = JournalSignatureRepository::open(&data_dir.join(JOURNAL_FILE_NAME))?;
            let report = signatures.opened_with();
            if !report.is_clean() {
                log::warn!(
                    "Journal repaired: {} transactions and {} lines discarded",
                    report.discarded_transactions,
                    report.discarded_lines
                );
            }
            println!("{}", serde_json::to_string_pretty(report)?);
            Ok(0)
        }
    }
}

fn build_embedder(
    cli: &Cli,
    config: &SignConfig,
) -> Result<Arc<FaceEmbedder>, Box<dyn std::error::Error>> {
    let detector: Arc<dyn FaceDetector> = match cli.detector {
        DetectorKind::Yolo => {
            let path = resolve_model(cli, YOLO_MODEL_NAME, YOLO_MODEL_URL)?;
            Arc::new(OnnxYoloDetector::new(&path, config.min_detection_confidence)?)
        }
        DetectorKind::FullFrame => Arc::new(FullFrameDetector),
    };
    let extractor: Arc<dyn EmbeddingExtractor> = match cli.extractor {
        ExtractorKind::Arcface => {
            let path = resolve_model(cli, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL)?;
            Arc::new(OnnxArcFaceExtractor::new(&path)?)
        }
        ExtractorKind::Histogram => Arc::new(HistogramEmbeddingExtractor),
    };

    Ok(Arc::new(FaceEmbedder::new(
        detector,
        extractor,
        FaceSelector::new(config.min_detection_confidence, config.ambiguity_margin),
        config.min_face_size,
    )))
}

fn resolve_model(
    cli: &Cli,
    name: &str,
    url: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {name}");
    let path = model_resolver::resolve(
        &ModelSource {
            name,
            url,
            bundled_dir: cli.model_dir.as_deref(),
            allow_download: !cli.no_download,
        },
        Some(Box::new(download_progress)),
    )?;
    Ok(path)
}

fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .ok_or_else(|| "Could not determine data directory; pass --data-dir".into()),
    }
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<ProbeImage>, Box<dyn std::error::Error>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.exists() {
            return Err(format!("Image not found: {}", path.display()).into());
        }
        images.push(ProbeImage::from_path(path)?);
    }
    Ok(images)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
