use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use console::style;
use tokio::sync::{mpsc, Semaphore};

use scigraph_core::artifacts::{
    read_document_stats, read_entities, write_document_artifacts, Checkpoint, CorpusStatistics,
};
use scigraph_core::{DocumentOutput, DocumentPipeline, ExtractionConfig};

pub struct ExtractOptions {
    pub input: PathBuf,
    pub out: PathBuf,
    pub config: Option<PathBuf>,
    pub jobs: usize,
    pub resume: bool,
    pub min_confidence: Option<f64>,
}

/// A text file to process, plus its pre-computed entity list if one sits next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub id: String,
    pub text_path: PathBuf,
    pub sidecar: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

fn is_text_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "txt")
}

fn document_source(text_path: PathBuf) -> Option<DocumentSource> {
    let id = text_path.file_stem()?.to_string_lossy().into_owned();
    let sidecar = text_path.with_file_name(format!("{id}.entities.json"));
    Some(DocumentSource {
        id,
        sidecar: sidecar.is_file().then_some(sidecar),
        text_path,
    })
}

/// The documents under `input`: the file itself, or every `.txt` file directly inside the
/// directory, sorted by path.
pub fn collect_documents(input: &Path) -> Result<Vec<DocumentSource>> {
    if input.is_file() {
        return Ok(document_source(input.to_path_buf()).into_iter().collect());
    }
    if !input.is_dir() {
        bail!("input '{}' does not exist", input.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(input)
        .with_context(|| format!("failed to read directory {}", input.display()))?
    {
        let path = entry?.path();
        if is_text_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().filter_map(document_source).collect())
}

fn process_document(pipeline: &DocumentPipeline, source: &DocumentSource) -> Result<DocumentOutput> {
    let text = std::fs::read_to_string(&source.text_path)
        .with_context(|| format!("failed to read {}", source.text_path.display()))?;

    let entities = source.sidecar.as_deref().and_then(|path| match read_entities(path) {
        Ok(entities) => Some(entities),
        Err(e) => {
            tracing::warn!(
                document_id = %source.id,
                sidecar = %path.display(),
                "ignoring invalid entity sidecar: {e}"
            );
            None
        }
    });

    Ok(pipeline.process(&source.id, &text, entities))
}

/// Fills in statistics for checkpointed documents the statistics file does not know about,
/// reading them back from the artifacts already on disk.
fn restore_skipped_statistics(statistics: &mut CorpusStatistics, out: &Path, skipped: &[String]) -> Result<()> {
    let mut restored = 0;
    for document_id in skipped {
        if statistics.per_document.contains_key(document_id) {
            continue;
        }
        match read_document_stats(out, document_id) {
            Ok(stats) => {
                statistics.record(document_id, &stats);
                restored += 1;
            }
            Err(e) => tracing::warn!(
                document_id = %document_id,
                "checkpointed document has unreadable artifacts: {e}"
            ),
        }
    }
    if restored > 0 {
        tracing::info!(restored, "rebuilt statistics for checkpointed documents");
        statistics
            .write(out)
            .context("failed to write corpus statistics")?;
    }
    Ok(())
}

/// Processes documents on blocking worker threads, at most `jobs` at a time. A single
/// writer persists each finished document, then the corpus statistics, then the checkpoint.
pub async fn run_batch(
    pipeline: Arc<DocumentPipeline>,
    documents: Vec<DocumentSource>,
    out: &Path,
    jobs: usize,
    resume: bool,
) -> Result<BatchSummary> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("failed to create output directory {}", out.display()))?;

    let mut checkpoint = Checkpoint::load(out).context("failed to load checkpoint")?;
    let mut statistics = if resume {
        CorpusStatistics::load(out).context("failed to load previous statistics")?
    } else {
        CorpusStatistics::new()
    };

    let (skipped, pending): (Vec<DocumentSource>, Vec<DocumentSource>) = documents
        .into_iter()
        .partition(|doc| resume && checkpoint.is_done(&doc.id));
    let skipped: Vec<String> = skipped.into_iter().map(|doc| doc.id).collect();
    for document_id in &skipped {
        tracing::debug!(document_id = %document_id, "skipping checkpointed document");
    }
    restore_skipped_statistics(&mut statistics, out, &skipped)?;

    let mut summary = BatchSummary {
        skipped: skipped.len(),
        ..BatchSummary::default()
    };

    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let (tx, mut rx) = mpsc::channel::<(String, Result<DocumentOutput>)>(jobs.max(1) * 2);

    let producer = tokio::spawn(async move {
        for doc in pending {
            let permit = semaphore.clone().acquire_owned().await?;
            let tx = tx.clone();
            let pipeline = Arc::clone(&pipeline);
            tokio::task::spawn_blocking(move || {
                let result = process_document(&pipeline, &doc);
                drop(permit);
                if tx.blocking_send((doc.id, result)).is_err() {
                    tracing::warn!("result writer stopped before all documents finished");
                }
            });
        }
        Ok::<_, anyhow::Error>(())
    });

    while let Some((document_id, result)) = rx.recv().await {
        match result {
            Ok(output) => {
                write_document_artifacts(out, &output)
                    .with_context(|| format!("failed to write artifacts for {document_id}"))?;
                statistics.record(&document_id, &output.stats);
                statistics
                    .write(out)
                    .context("failed to write corpus statistics")?;
                checkpoint
                    .mark_done(&document_id)
                    .context("failed to update checkpoint")?;
                summary.processed += 1;
            }
            Err(e) => {
                tracing::warn!(document_id = %document_id, "document failed: {e:#}");
                statistics.record_failure(&document_id, format!("{e:#}"));
                statistics
                    .write(out)
                    .context("failed to write corpus statistics")?;
                summary.failed += 1;
            }
        }
    }

    producer.await.context("document scheduler panicked")??;
    // an empty run still leaves a statistics file behind
    statistics
        .write(out)
        .context("failed to write corpus statistics")?;
    Ok(summary)
}

pub fn run(options: &ExtractOptions) -> Result<()> {
    let (mut config, _) =
        ExtractionConfig::discover(options.config.as_deref()).context("failed to load config")?;
    if let Some(min_confidence) = options.min_confidence {
        config.filters.min_relationship_confidence = min_confidence;
    }
    let pipeline = Arc::new(DocumentPipeline::new(&config).context("invalid configuration")?);

    let documents = collect_documents(&options.input)?;
    if documents.is_empty() {
        eprintln!(
            "{} No .txt documents found in {}",
            style("○").dim(),
            options.input.display()
        );
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let summary = runtime.block_on(run_batch(
        pipeline,
        documents,
        &options.out,
        options.jobs,
        options.resume,
    ))?;

    eprintln!(
        "{} Processed {} document(s), {} skipped, {} failed -> {}",
        if summary.failed == 0 {
            style("●").green()
        } else {
            style("●").yellow()
        },
        summary.processed,
        summary.skipped,
        summary.failed,
        options.out.display()
    );
    Ok(())
}
