//! Command implementations

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::adapters::sources::{mime_type_for, FileSource};
use crate::adapters::{ProbeLibavAdapter, QueueConfig};
use crate::app::container::{AppContainer, DefaultAppContainer};
use crate::app::snapshot::QueueSnapshot;
use crate::cli::args::{ProbeArgs, RunArgs};
use crate::domain::model::{InterpolationFactor, Job, JobId, JobStatus};
use crate::domain::rules::download_name;
use crate::engine::EngineState;
use crate::error::SmoothframeError;
use crate::ports::{ByteSource, ProbePort};
use crate::probe::MetadataProber;
use crate::utils::{format_file_size, format_seconds};

/// Execute the run command
pub async fn run(args: RunArgs, config: &QueueConfig) -> Result<()> {
    let factor = match args.factor {
        Some(factor) => InterpolationFactor::new(factor)?,
        None => config.factor()?,
    };
    let mut config = config.clone();
    if let Some(ffmpeg) = args.ffmpeg {
        config.ffmpeg_path = ffmpeg;
    }

    let inputs = collect_inputs(&args.paths)?;
    info!(count = inputs.len(), %factor, "Collected inputs");

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let container = if args.simulate {
        DefaultAppContainer::simulated(&config)?
    } else {
        DefaultAppContainer::new(&config)?
    };
    let queue = container.queue();

    if queue.start().await == EngineState::Failed {
        queue.shutdown();
        return Err(SmoothframeError::EngineUnavailable {
            message: format!("could not start {}", config.ffmpeg_path.display()),
        }
        .into());
    }

    let mut sources: Vec<Arc<dyn ByteSource>> = Vec::with_capacity(inputs.len());
    for path in &inputs {
        sources.push(Arc::new(FileSource::open(path)?));
    }
    queue.select_files(sources).await;

    let job_ids = queue.commit_to_queue(factor);
    if job_ids.is_empty() {
        queue.shutdown();
        anyhow::bail!("No readable video files to process");
    }

    let finished = match wait_for_jobs(&container, &job_ids).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            queue.shutdown();
            return Err(err);
        }
    };
    queue.shutdown();

    let mut failed = 0;
    for job in finished.jobs.iter().filter(|job| job_ids.contains(&job.id())) {
        match job.status() {
            JobStatus::Completed { .. } => {
                let written = write_result(&container, job, &args.output_dir).await?;
                println!("{}", written.display());
            }
            JobStatus::Error(processing_error) => {
                failed += 1;
                error!(file_name = job.file_name(), error = %processing_error, "Job failed");
                eprintln!("{}: {}", job.file_name(), processing_error);
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }
    }

    if failed > 0 {
        return Err(SmoothframeError::JobsFailed {
            failed,
            total: job_ids.len(),
        }
        .into());
    }
    info!(count = job_ids.len(), "All jobs completed");
    Ok(())
}

/// Execute the probe command
pub async fn probe(args: ProbeArgs, config: &QueueConfig) -> Result<()> {
    let source: Arc<dyn ByteSource> = Arc::new(FileSource::open(&args.path)?);
    let port: Arc<dyn ProbePort> = Arc::new(ProbeLibavAdapter::new()?);
    let prober = MetadataProber::new(port, config.probe_defaults()?);

    let outcome = prober
        .probe(args.path.display().to_string(), Arc::clone(&source))
        .await
        .with_context(|| format!("Failed to probe {}", args.path.display()))?;

    let report = json!({
        "file": source.name(),
        "mime_type": source.mime_type(),
        "size": source.size(),
        "duration": outcome.metadata.duration,
        "frame_rate": outcome.metadata.frame_rate,
    });
    let text = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", text);
    Ok(())
}

/// Expand directories into the video files they contain, sorted by path
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!(%err, "Skipping unreadable directory entry");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| mime_type_for(path).starts_with("video/"))
                .collect();
            found.sort();
            inputs.extend(found);
        } else if path.is_file() {
            inputs.push(path.clone());
        } else {
            return Err(SmoothframeError::InputNotFound { path: path.clone() }.into());
        }
    }
    Ok(inputs)
}

/// Follow snapshots until every job in `job_ids` has settled
///
/// Ctrl-C cancels the active job, drops the rest and ends the run.
async fn wait_for_jobs(container: &DefaultAppContainer, job_ids: &[JobId]) -> Result<QueueSnapshot> {
    let queue = container.queue();
    let mut snapshots = queue.subscribe();
    let mut view = ProgressView::default();

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        view.render(&snapshot);
        let settled = job_ids.iter().all(|id| {
            snapshot
                .job(*id)
                .map_or(true, |job| job.status().is_terminal())
        });
        if settled {
            return Ok(snapshot);
        }

        tokio::select! {
            changed = snapshots.changed() => {
                changed.context("Queue service stopped publishing")?;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling");
                for id in job_ids {
                    queue.remove_job(*id).await;
                }
                return Err(SmoothframeError::Interrupted.into());
            }
        }
    }
}

/// Copy a completed result out of its object URL into `output_dir`
async fn write_result(container: &DefaultAppContainer, job: &Job, output_dir: &Path) -> Result<PathBuf> {
    let url = job
        .processed_url()
        .with_context(|| format!("{} has no result", job.file_name()))?;
    let result = container
        .urls()
        .resolve(url)
        .with_context(|| format!("Result of {} is no longer available", job.file_name()))?;
    let bytes = result.read_all().await?;

    let target = output_dir.join(download_name(job.file_name()));
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!(
        file = %target.display(),
        size = %format_file_size(bytes.len() as u64),
        "Wrote interpolated video"
    );
    Ok(target)
}

/// Logs status changes and progress in 10% steps
#[derive(Default)]
struct ProgressView {
    seen: HashMap<JobId, (&'static str, u32)>,
}

impl ProgressView {
    fn render(&mut self, snapshot: &QueueSnapshot) {
        for job in &snapshot.jobs {
            let state = (job.status().name(), (job.progress() / 10.0).floor() as u32);
            if self.seen.get(&job.id()) == Some(&state) {
                continue;
            }
            self.seen.insert(job.id(), state);
            info!(
                file_name = job.file_name(),
                status = %job.status(),
                progress = job.progress().round(),
                duration = %job.duration().map(format_seconds).unwrap_or_else(|| "?".to_string()),
                target_fps = ?job.frame_rate().map(|fps| job.factor().target_frame_rate(fps)),
                "Job update"
            );
        }
    }
}
